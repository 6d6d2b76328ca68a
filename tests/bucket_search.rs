// tests/bucket_search.rs

//! Enumeration, search and architecture fallback through the registry.

mod common;

use common::BucketTree;
use pallet::{Arch, BucketRegistry, Error};

#[test]
fn test_matching_callback_sees_each_bucket_once() {
    let mut tree = BucketTree::new();
    tree.add("a", "foo", r#"{"version": "1.0", "url": "https://a.example/foo.zip"}"#);
    tree.add("a", "bar", r#"{"version": "1.0", "url": "https://a.example/bar.zip"}"#);
    tree.add("b", "foo", r#"{"version": "2.0", "url": "https://b.example/foo.zip"}"#);

    let registry = BucketRegistry::new(tree.root(), tree.buckets.clone()).with_arch(Arch::X64);
    let mut hits = Vec::new();
    registry.for_each_matching(
        |name| name == "foo",
        |bucket, name| {
            let pkg = registry.resolve(bucket, name).unwrap();
            hits.push((bucket.name.clone(), pkg.version.clone(), pkg.urls.clone()));
        },
    );

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0], ("a".into(), "1.0".into(), vec!["https://a.example/foo.zip".to_string()]));
    assert_eq!(hits[1], ("b".into(), "2.0".into(), vec!["https://b.example/foo.zip".to_string()]));
}

#[test]
fn test_search_spans_buckets_in_order() {
    let mut tree = BucketTree::new();
    tree.add("main", "nodejs", r#"{"version": "20.9.0", "url": "https://e/node.zip"}"#);
    tree.add("main", "deno", r#"{"version": "1.38.0", "url": "https://e/deno.zip"}"#);
    tree.add("extra", "nodejs-lts", r#"{"version": "18.18.2", "url": "https://e/lts.zip"}"#);

    let registry = BucketRegistry::new(tree.root(), tree.buckets.clone()).with_arch(Arch::X64);
    let found: Vec<_> = registry
        .search("node")
        .unwrap()
        .into_iter()
        .map(|p| format!("{}/{}", p.bucket, p.name))
        .collect();
    assert_eq!(found, vec!["main/nodejs", "extra/nodejs-lts"]);

    assert!(registry.search("*.exe").unwrap().is_empty());
}

#[test]
fn test_arch_fallback_through_registry() {
    let mut tree = BucketTree::new();
    tree.add(
        "main",
        "tool",
        r#"{
            "version": "3.1",
            "url": "https://e/tool-generic.zip",
            "url.hash": "sha256:aaaa",
            "url64": ["https://e/tool-x64.zip", "https://mirror/tool-x64.zip"],
            "url64.hash": "sha256:bbbb",
            "links": "bin/tool.exe",
            "launchers": ["tool.exe"]
        }"#,
    );

    let registry = BucketRegistry::new(tree.root(), tree.buckets.clone());
    let x64 = registry.clone().with_arch(Arch::X64).find("tool").unwrap();
    assert_eq!(x64.urls, vec!["https://e/tool-x64.zip", "https://mirror/tool-x64.zip"]);
    assert_eq!(x64.hash, "sha256:bbbb");
    assert_eq!(x64.launchers, vec!["tool.exe"]);

    // no urlarm64: the generic url runs under emulation before url64 does
    let arm = registry.clone().with_arch(Arch::Arm64).find("tool").unwrap();
    assert_eq!(arm.urls, vec!["https://e/tool-generic.zip"]);
    assert_eq!(arm.hash, "sha256:aaaa");
    assert_eq!(arm.links, vec!["bin/tool.exe"]);
    assert_eq!(arm.launchers, vec!["tool.exe"]);

    let generic = registry.with_arch(Arch::Other).find("tool").unwrap();
    assert_eq!(generic.urls, vec!["https://e/tool-generic.zip"]);
    assert_eq!(generic.hash, "sha256:aaaa");
}

#[test]
fn test_unported_and_broken_descriptors() {
    let mut tree = BucketTree::new();
    tree.add("main", "winonly", r#"{"version": "1", "url64": "https://e/w.zip"}"#);
    tree.add("main", "broken", r#"{"version": "#);

    let registry = BucketRegistry::new(tree.root(), tree.buckets.clone()).with_arch(Arch::Other);
    assert!(matches!(registry.find("winonly"), Err(Error::NotPorted { .. })));
    assert!(matches!(registry.find("broken"), Err(Error::DescriptorParse { .. })));
    assert!(matches!(registry.find("absent"), Err(Error::NotFound(_))));
}

#[test]
fn test_arm64_launchers_reuse_links() {
    let mut tree = BucketTree::new();
    tree.add(
        "main",
        "editor",
        r#"{"version": "1.0", "url": "https://e/ed.zip", "links": ["ed.exe", "edc.exe"]}"#,
    );

    let registry = BucketRegistry::new(tree.root(), tree.buckets.clone());
    let arm = registry.clone().with_arch(Arch::Arm64).find("editor").unwrap();
    assert_eq!(arm.launchers, vec!["ed.exe", "edc.exe"]);

    let x64 = registry.with_arch(Arch::X64).find("editor").unwrap();
    assert!(x64.launchers.is_empty());
}
