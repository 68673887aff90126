use keyseek_core::persist::{ArticleRow, ArticleStore, RowKey, StoreError, StoredArticle};
use keyseek_core::tokenizer::TokenizeError;
use keyseek_core::{
    ArticleId, Deletion, Engine, EngineConfig, EngineError, Keyword, MemoryStore, SledStore, TokenIndex, Tokenizer,
    WhitespaceTokenizer,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

fn mem_engine() -> Engine {
    Engine::open(MemoryStore::new(), WhitespaceTokenizer, EngineConfig::default()).unwrap()
}

fn scores_by_content(engine: &Engine, query: &str) -> HashMap<String, f64> {
    engine.search(query).unwrap().hits.into_iter().map(|h| (h.content, h.score)).collect()
}

/// MemoryStore with switchable failures.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_insert: AtomicBool,
    fail_mark: AtomicBool,
    fail_load: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store offline".into()))
        } else {
            Ok(())
        }
    }
}

impl ArticleStore for FlakyStore {
    fn insert(&self, row: &ArticleRow) -> Result<RowKey, StoreError> {
        Self::check(&self.fail_insert)?;
        self.inner.insert(row)
    }

    fn mark_deleted(&self, key: RowKey) -> Result<(), StoreError> {
        Self::check(&self.fail_mark)?;
        self.inner.mark_deleted(key)
    }

    fn load_all(&self) -> Result<Vec<StoredArticle>, StoreError> {
        Self::check(&self.fail_load)?;
        self.inner.load_all()
    }
}

/// Whitespace tokens, except that the text "twice" yields the token "a" twice.
struct RepeatingTokenizer;

impl Tokenizer for RepeatingTokenizer {
    fn keywords(&self, text: &str) -> Result<Vec<Keyword>, TokenizeError> {
        if text == "twice" {
            return Ok(vec![Keyword::new("a", 1.0), Keyword::new("a", 2.0)]);
        }
        WhitespaceTokenizer.keywords(text)
    }
}

#[test]
fn cat_and_dog_scenario() {
    let e = mem_engine();
    e.add_entry("the cat sat").unwrap();
    e.add_entry("the dog ran").unwrap();
    e.add_entry("cat and dog").unwrap();

    let out = e.search("cat").unwrap();
    let contents: Vec<&str> = out.hits.iter().map(|h| h.content.as_str()).collect();
    assert_eq!(contents, vec!["the cat sat", "cat and dog"]);
    assert!(out.hits.iter().all(|h| h.score > 0.0));
}

#[test]
fn every_article_matches_itself_first() {
    let e = mem_engine();
    let docs: Vec<String> = (0..30).map(|i| format!("unique{i} shared")).collect();
    for d in &docs {
        e.add_entry(d).unwrap();
    }
    for (i, d) in docs.iter().enumerate() {
        let hits = e.search(d).unwrap().hits;
        assert_eq!(hits[0].id, i as ArticleId);
        assert!(hits[0].score > hits[1].score);
    }
}

#[test]
fn results_are_capped_and_sorted() {
    let e = mem_engine();
    for i in 0..50 {
        let filler: Vec<String> = (0..(i % 7)).map(|j| format!("f{i}_{j}")).collect();
        e.add_entry(&format!("needle {}", filler.join(" "))).unwrap();
    }
    let hits = e.search("needle").unwrap().hits;
    assert_eq!(hits.len(), 20);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn empty_inputs_give_empty_results() {
    let e = mem_engine();
    assert!(e.search("anything").unwrap().hits.is_empty());
    e.add_entry("some text").unwrap();
    let out = e.search("   ").unwrap();
    assert!(out.keywords.is_empty());
    assert!(out.hits.is_empty());
    assert!(e.search("nomatch").unwrap().hits.is_empty());
}

#[test]
fn never_inserted_token_queries_empty() {
    let idx = TokenIndex::new();
    assert_eq!(idx.query("ghost").len(), 0);
}

#[test]
fn deleted_articles_stay_hidden_across_rebuild() {
    let e = mem_engine();
    let keep = e.add_entry("red apple").unwrap();
    let gone = e.add_entry("red cherry").unwrap();
    assert_eq!(e.search("red").unwrap().hits.len(), 2);

    e.delete(gone).unwrap();
    let hits = e.search("red").unwrap().hits;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, keep);

    e.rebuild().unwrap();
    let hits = e.search("red").unwrap().hits;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, keep);
    // ids survive the rebuild, the tombstone too
    assert!(e.get(gone).unwrap().deleted);
    assert!(matches!(e.delete(gone), Ok(Deletion::AlreadyDeleted)));
    assert_eq!(e.stats().pending_deletions, 0);
}

#[test]
fn rebuild_fires_once_per_thousand_deletes() {
    let e = mem_engine();
    for i in 0..2000 {
        e.add_entry(&format!("doc{i} common")).unwrap();
    }
    let mut compactions = Vec::new();
    for id in 0..2000 {
        if e.delete(id).unwrap() == Deletion::Compacted {
            compactions.push(id);
        }
    }
    assert_eq!(compactions, vec![999, 1999]);
    assert_eq!(e.stats().pending_deletions, 0);
    assert!(e.search("common").unwrap().hits.is_empty());
}

#[test]
fn compacted_index_scores_like_a_fresh_one() {
    let config = EngineConfig { rebuild_threshold: 2, ..EngineConfig::default() };
    let docs = ["a b c", "a a2 b2", "b c d e", "a e", "c d"];
    let compacted = Engine::open(MemoryStore::new(), WhitespaceTokenizer, config).unwrap();
    for d in docs {
        compacted.add_entry(d).unwrap();
    }
    assert_eq!(compacted.delete(1).unwrap(), Deletion::Tombstoned);
    assert_eq!(compacted.delete(3).unwrap(), Deletion::Compacted);

    let fresh = mem_engine();
    for d in ["a b c", "b c d e", "c d"] {
        fresh.add_entry(d).unwrap();
    }
    for q in ["a", "b", "c d", "e a"] {
        assert_eq!(scores_by_content(&compacted, q), scores_by_content(&fresh, q), "query {q:?}");
    }
    assert_eq!(compacted.stats().tokens, fresh.stats().tokens);
}

#[test]
fn scores_survive_restart_from_sled() {
    let dir = tempfile::tempdir().unwrap();
    let before = {
        let e = Engine::open(SledStore::open(dir.path()).unwrap(), WhitespaceTokenizer, EngineConfig::default())
            .unwrap();
        e.add_entry("hello world").unwrap();
        e.add_entry("goodbye world").unwrap();
        e.search("hello").unwrap().hits
    };
    let e = Engine::open(SledStore::open(dir.path()).unwrap(), WhitespaceTokenizer, EngineConfig::default()).unwrap();
    let after = e.search("hello").unwrap().hits;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].content, "hello world");
    assert_eq!(after[0].score, before[0].score);
}

#[test]
fn deletes_survive_restart_from_sled() {
    let dir = tempfile::tempdir().unwrap();
    {
        let e = Engine::open(SledStore::open(dir.path()).unwrap(), WhitespaceTokenizer, EngineConfig::default())
            .unwrap();
        e.add_entry("one fish").unwrap();
        e.add_entry("two fish").unwrap();
        e.delete(0).unwrap();
    }
    let e = Engine::open(SledStore::open(dir.path()).unwrap(), WhitespaceTokenizer, EngineConfig::default()).unwrap();
    let hits = e.search("fish").unwrap().hits;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "two fish");
    assert_eq!(e.stats().articles, 2);
}

#[test]
fn failed_insert_is_reported_but_stays_searchable() {
    let store = Arc::new(FlakyStore::default());
    let e = Engine::open(store.clone(), WhitespaceTokenizer, EngineConfig::default()).unwrap();
    store.fail_insert.store(true, Ordering::SeqCst);
    assert!(matches!(e.add_entry("orphan text"), Err(EngineError::Persistence(_))));
    assert_eq!(e.search("orphan").unwrap().hits.len(), 1);
    assert!(store.inner.is_empty());
}

#[test]
fn failed_tombstone_write_changes_nothing() {
    let store = Arc::new(FlakyStore::default());
    let e = Engine::open(store.clone(), WhitespaceTokenizer, EngineConfig::default()).unwrap();
    let id = e.add_entry("sticky note").unwrap();
    store.fail_mark.store(true, Ordering::SeqCst);
    assert!(matches!(e.delete(id), Err(EngineError::Persistence(_))));
    assert_eq!(e.search("sticky").unwrap().hits.len(), 1);
    assert_eq!(e.stats().pending_deletions, 0);
}

#[test]
fn failed_rebuild_keeps_previous_index_and_retries() {
    let store = Arc::new(FlakyStore::default());
    let config = EngineConfig { rebuild_threshold: 2, ..EngineConfig::default() };
    let e = Engine::open(store.clone(), WhitespaceTokenizer, config).unwrap();
    for d in ["x one", "x two", "x three", "x four"] {
        e.add_entry(d).unwrap();
    }
    e.delete(0).unwrap();

    store.fail_load.store(true, Ordering::SeqCst);
    assert!(matches!(e.delete(1), Err(EngineError::Persistence(_))));
    assert_eq!(e.search("x").unwrap().hits.len(), 2);
    assert_eq!(e.stats().pending_deletions, 2);
    assert!(e.rebuild().is_err());

    store.fail_load.store(false, Ordering::SeqCst);
    assert_eq!(e.delete(2).unwrap(), Deletion::Compacted);
    let hits = e.search("x").unwrap().hits;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "x four");
}

#[test]
fn searches_run_alongside_writes() {
    let e = Arc::new(mem_engine());
    e.add_entry("seed term").unwrap();
    std::thread::scope(|s| {
        let writer = e.clone();
        s.spawn(move || {
            for i in 0..200 {
                writer.add_entry(&format!("term item{i}")).unwrap();
            }
        });
        for _ in 0..4 {
            let reader = e.clone();
            s.spawn(move || {
                for _ in 0..200 {
                    let hits = reader.search("term").unwrap().hits;
                    assert!(!hits.is_empty() && hits.len() <= 20);
                }
            });
        }
    });
    assert_eq!(e.stats().articles, 201);
}

#[test]
fn ids_stay_put_when_an_insert_was_not_persisted() {
    let store = Arc::new(FlakyStore::default());
    let e = Engine::open(store.clone(), WhitespaceTokenizer, EngineConfig::default()).unwrap();
    assert_eq!(e.add_entry("alpha").unwrap(), 0);
    store.fail_insert.store(true, Ordering::SeqCst);
    assert!(e.add_entry("bravo").is_err());
    store.fail_insert.store(false, Ordering::SeqCst);
    assert_eq!(e.add_entry("charlie").unwrap(), 2);
    assert_eq!(e.add_entry("delta").unwrap(), 3);

    e.rebuild().unwrap();
    assert_eq!(e.get(2).unwrap().content, "charlie");
    assert_eq!(e.get(3).unwrap().content, "delta");
    // the lost article's slot is retired, not handed to someone else
    assert!(e.get(1).unwrap().deleted);
    assert!(e.search("bravo").unwrap().hits.is_empty());

    assert_eq!(e.delete(2).unwrap(), Deletion::Tombstoned);
    assert!(e.search("charlie").unwrap().hits.is_empty());
    assert_eq!(e.search("delta").unwrap().hits[0].id, 3);
    assert_eq!(e.add_entry("echo").unwrap(), 4);

    // a restart over the same rows lands on the same ids
    let reopened = Engine::open(store.clone(), WhitespaceTokenizer, EngineConfig::default()).unwrap();
    assert_eq!(reopened.get(3).unwrap().content, "delta");
    assert_eq!(reopened.get(4).unwrap().content, "echo");
    assert!(reopened.get(2).unwrap().deleted);
    assert_eq!(reopened.search("echo").unwrap().hits[0].id, 4);
}

#[test]
fn trailing_unpersisted_id_is_not_reused_after_rebuild() {
    let store = Arc::new(FlakyStore::default());
    let e = Engine::open(store.clone(), WhitespaceTokenizer, EngineConfig::default()).unwrap();
    e.add_entry("first").unwrap();
    store.fail_insert.store(true, Ordering::SeqCst);
    assert!(e.add_entry("lost").is_err());
    store.fail_insert.store(false, Ordering::SeqCst);

    e.rebuild().unwrap();
    assert_eq!(e.add_entry("next").unwrap(), 2);
    assert!(matches!(e.delete(1), Ok(Deletion::AlreadyDeleted)));
}

#[test]
fn repeated_tokens_in_one_article_add_up() {
    let e = Engine::open(MemoryStore::new(), RepeatingTokenizer, EngineConfig::default()).unwrap();
    let id = e.add_entry("twice").unwrap();
    e.add_entry("a b").unwrap();

    let norm = (1.0f64 + 4.0).sqrt();
    let expected = (1.0 * 1.0 + 2.0 * 1.0) / norm;
    let hits = e.search("a").unwrap().hits;
    assert_eq!(hits[0].id, id);
    assert!((hits[0].score - expected).abs() < 1e-12);
    assert_eq!(e.stats().postings, 4);

    e.rebuild().unwrap();
    let after = e.search("a").unwrap().hits;
    assert_eq!(after[0].id, id);
    assert_eq!(after[0].score, hits[0].score);
    assert_eq!(e.stats().postings, 4);
}

#[test]
fn searches_never_see_a_half_rebuilt_index() {
    let config = EngineConfig { rebuild_threshold: 5, ..EngineConfig::default() };
    let e = Arc::new(Engine::open(MemoryStore::new(), WhitespaceTokenizer, config).unwrap());
    for i in 0..200 {
        e.add_entry(&format!("term item{i}")).unwrap();
    }
    // every id below this has been deleted and the delete has returned
    let deleted_below = Arc::new(AtomicU32::new(0));

    std::thread::scope(|s| {
        let writer = e.clone();
        let floor = deleted_below.clone();
        s.spawn(move || {
            for id in 0..120 {
                writer.delete(id).unwrap();
                floor.store(id + 1, Ordering::SeqCst);
                if id % 17 == 0 {
                    writer.rebuild().unwrap();
                }
            }
        });
        for _ in 0..4 {
            let reader = e.clone();
            let floor = deleted_below.clone();
            s.spawn(move || {
                for _ in 0..300 {
                    let before = floor.load(Ordering::SeqCst);
                    let hits = reader.search("term").unwrap().hits;
                    assert_eq!(hits.len(), 20);
                    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
                    for h in &hits {
                        assert!(h.id >= before, "deleted article {} returned", h.id);
                        assert_eq!(h.content, format!("term item{}", h.id));
                    }
                }
            });
        }
    });

    let hits = e.search("term").unwrap().hits;
    assert_eq!(hits[0].id, 120);
    assert_eq!(e.stats().live, 80);
}
