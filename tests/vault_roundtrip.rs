//! End-to-end exercise of the core library against a scratch vault: create a
//! note, index the vault, and retrieve it back through the hybrid retriever.
//! Stands in for the old MCP stdio smoke test now that the tool-dispatch
//! surface is out of scope — this test drives the library directly instead
//! of spawning a subprocess.

use obsidianrag_core::embeddings::EmbeddingBackend;
use obsidianrag_core::errors::CoreResult;
use obsidianrag_core::security::ForbiddenPatterns;
use obsidianrag_core::vault::VaultContext;
use obsidianrag_core::write_path::{self, CreateArgs};
use std::sync::Arc;
use tempfile::TempDir;

struct DeterministicEmbedder;

impl EmbeddingBackend for DeterministicEmbedder {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        const DIM: usize = 16;
        let mut v = vec![0f32; DIM];
        for (i, byte) in text.bytes().enumerate() {
            v[(byte as usize + i) % DIM] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

#[test]
fn create_index_and_retrieve_round_trip() {
    let tmp = TempDir::new().unwrap();
    let ctx = VaultContext::open(tmp.path(), Arc::new(DeterministicEmbedder)).unwrap();

    let path = write_path::create(
        &ctx.root,
        &ctx.forbidden,
        None,
        None,
        CreateArgs {
            title: "Rust Ownership",
            body: "Ownership is Rust's central feature for memory safety without a garbage collector.",
            folder: Some("Notes"),
            tags_csv: "rust, memory",
            template_name: None,
            agent: None,
        },
    )
    .unwrap();
    assert!(path.exists());

    let stats = ctx.indexer.ensure_index(true);
    assert!(stats.success);
    assert_eq!(stats.docs_processed, 1);

    let hits = ctx.retriever.retrieve("rust ownership memory safety", None).unwrap();
    assert!(!hits.is_empty());
    assert!(hits[0].chunk.source.contains("Rust Ownership.md"));
}

#[test]
fn write_path_rejects_escapes_outside_vault() {
    let tmp = TempDir::new().unwrap();
    let forbidden = ForbiddenPatterns::load(tmp.path(), &[]).unwrap();
    let err = write_path::create(
        tmp.path(),
        &forbidden,
        None,
        None,
        CreateArgs { title: "../escape", body: "x", folder: Some("../../etc"), tags_csv: "", template_name: None, agent: None },
    )
    .unwrap_err();
    assert_eq!(err.kind, obsidianrag_core::errors::ErrorKind::Forbidden);
}
