use std::fs;

use tempfile::TempDir;

use bookqa_embed::EmbeddingCache;

#[test]
fn values_persist_across_reopen() {
    let tmp = TempDir::new().expect("tmp");
    let key = EmbeddingCache::key_for("call me Ishmael");
    {
        let cache = EmbeddingCache::open(tmp.path()).expect("open");
        assert!(cache.get(&key).is_none());
        cache.put(&key, &[0.25, -0.5, 1.0]).expect("put");
    }
    let cache = EmbeddingCache::open(tmp.path()).expect("reopen");
    assert_eq!(cache.get(&key), Some(vec![0.25, -0.5, 1.0]));
    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 0));
}

#[test]
fn put_overwrites_existing_value() {
    let tmp = TempDir::new().expect("tmp");
    let cache = EmbeddingCache::open(tmp.path()).expect("open");
    cache.put("k", &[1.0]).expect("put");
    cache.put("k", &[2.0, 3.0]).expect("put");
    assert_eq!(cache.get("k"), Some(vec![2.0, 3.0]));
}

#[test]
fn keys_ignore_whitespace_layout() {
    assert_eq!(EmbeddingCache::key_for("  hello \n world "), EmbeddingCache::key_for("hello world"));
    assert_ne!(EmbeddingCache::key_for("hello world"), EmbeddingCache::key_for("hello worlds"));
    assert_eq!(EmbeddingCache::key_for("x").len(), 64);
}

#[test]
fn corrupt_entries_read_as_misses() {
    let tmp = TempDir::new().expect("tmp");
    let cache = EmbeddingCache::open(tmp.path()).expect("open");
    fs::write(tmp.path().join("broken.vec.json"), b"{not json").expect("write");
    fs::write(
        tmp.path().join("short.vec.json"),
        br#"{"format":"v1","dim":3,"vector":[1.0]}"#,
    )
    .expect("write");
    fs::write(tmp.path().join("future.vec.json"), br#"{"format":"v9","vector":[1.0]}"#).expect("write");

    assert!(cache.get("broken").is_none());
    assert!(cache.get("short").is_none());
    assert!(cache.get("future").is_none());
    assert_eq!(cache.stats().misses, 3);

    cache.put("broken", &[0.5]).expect("repair");
    assert_eq!(cache.get("broken"), Some(vec![0.5]));
}

#[test]
fn clear_removes_only_records() {
    let tmp = TempDir::new().expect("tmp");
    let cache = EmbeddingCache::open(tmp.path()).expect("open");
    cache.put("a", &[1.0]).expect("put");
    cache.put("b", &[2.0]).expect("put");
    fs::write(tmp.path().join("notes.txt"), "keep").expect("write");

    assert_eq!(cache.clear().expect("clear"), 2);
    assert!(cache.get("a").is_none());
    assert!(tmp.path().join("notes.txt").exists());
}

#[test]
fn namespaces_separate_models() {
    let tmp = TempDir::new().expect("tmp");
    let a = EmbeddingCache::open_namespaced(tmp.path(), "openai:text-embedding-3-small").expect("open");
    let b = EmbeddingCache::open_namespaced(tmp.path(), "fake:xxh64:d8").expect("open");
    a.put("k", &[1.0]).expect("put");
    assert!(b.get("k").is_none());
    assert_ne!(a.dir(), b.dir());
}
