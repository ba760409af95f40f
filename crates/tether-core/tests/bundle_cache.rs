//! Bundle cache behaviour with real descriptors.

mod support;

use std::fs;

use tether_core::cache::BundleCache;

use support::Site;

#[test]
fn pinned_catalog_bundles_are_reused_from_disk() {
    let site = Site::new();
    site.publish_config("v1", "first");
    let descriptor = site.descriptor("catalog:primary?version=v1");

    let mut cache = BundleCache::new(site.cache_dir.clone());
    assert!(cache.local_path(descriptor.as_ref()).is_none());
    let path = cache.ensure_local(descriptor.as_ref()).unwrap();
    assert!(path.starts_with(site.cache_dir.join("catalog")));
    assert!(path.join("info.toml").is_file());

    // Removing the archive does not matter once the bundle is cached.
    fs::remove_file(site.catalog_dir.join("primary/v1.zip")).unwrap();
    let mut later = BundleCache::new(site.cache_dir.clone());
    assert_eq!(later.ensure_local(descriptor.as_ref()).unwrap(), path);
}

#[test]
fn floating_catalog_bundle_follows_latest_version() {
    let site = Site::new();
    site.publish_config("v1.2.0", "one-two");
    site.publish_config("v1.10.0", "one-ten");
    site.publish_config("v1.9.3", "one-nine");

    let descriptor = site.descriptor("catalog:primary");
    assert!(!descriptor.is_immutable());
    assert_eq!(descriptor.version(), Some("v1.10.0"));

    let mut cache = BundleCache::new(site.cache_dir.clone());
    let path = cache.ensure_local(descriptor.as_ref()).unwrap();
    assert_eq!(
        fs::read_to_string(path.join("env/project.toml")).unwrap(),
        "label = \"one-ten\"\n"
    );

    // Same session: no refetch. New session: fetched again.
    assert_eq!(cache.local_path(descriptor.as_ref()), Some(path.clone()));
    cache.refresh();
    assert_eq!(cache.local_path(descriptor.as_ref()), None);
}

#[test]
fn fallback_roots_are_consulted_before_fetching() {
    let site = Site::new();
    site.publish_config("v1", "first");
    let descriptor = site.descriptor("catalog:primary?version=v1");

    let fallback = site.tmp.path().join("shared-cache");
    let seeded = BundleCache::new(fallback.clone())
        .ensure_local(descriptor.as_ref())
        .unwrap();
    fs::remove_file(site.catalog_dir.join("primary/v1.zip")).unwrap();

    let mut cache = BundleCache::new(site.cache_dir.clone()).with_fallback_roots(vec![fallback]);
    assert_eq!(cache.ensure_local(descriptor.as_ref()).unwrap(), seeded);
}
