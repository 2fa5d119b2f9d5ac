use super::*;

fn reconstruct(chunks: &[&str], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(chunk);
        } else {
            text.extend(chunk.chars().skip(overlap));
        }
    }
    text
}

fn arabic_corpus() -> String {
    let paragraph = "القيم الاخلاقيه اساس المجتمع. الصدق والامانه من اهم القيم! هل نتعلمها في المدرسه؟ نعم";
    (0..40)
        .map(|i| format!("{paragraph} {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn hard_cut_without_boundaries() {
    let text = "A".repeat(2500);
    let chunks: Vec<&str> = split(&text, 1000, 100)
        .expect("split should succeed")
        .collect();

    let lengths: Vec<usize> = chunks.iter().map(|c| c.chars().count()).collect();
    assert_eq!(lengths, vec![1000, 1000, 700]);
    assert_eq!(reconstruct(&chunks, 100), text);
}

#[test]
fn stride_is_chunk_size_minus_overlap_for_hard_cuts() {
    let text: String = (0..30).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let chunks: Vec<&str> = split(&text, 10, 3).expect("split should succeed").collect();

    assert_eq!(chunks[0], &text[0..10]);
    assert_eq!(chunks[1], &text[7..17]);
    assert_eq!(chunks[2], &text[14..24]);
    assert_eq!(chunks[3], &text[21..30]);
    assert_eq!(chunks.len(), 4);
}

#[test]
fn empty_and_whitespace_input_yield_nothing() {
    assert_eq!(split("", 10, 2).expect("split should succeed").count(), 0);
    assert_eq!(
        split(" \n\t  \n", 10, 2)
            .expect("split should succeed")
            .count(),
        0
    );
}

#[test]
fn short_text_is_single_chunk() {
    let chunks: Vec<&str> = split("قصير", 1000, 100)
        .expect("split should succeed")
        .collect();
    assert_eq!(chunks, vec!["قصير"]);
}

#[test]
fn rejects_invalid_sizes() {
    assert_eq!(
        split("text", 0, 0).err(),
        Some(ChunkingError::InvalidChunkSize(0))
    );
    assert_eq!(
        split("text", 10, 10).err(),
        Some(ChunkingError::InvalidOverlap {
            overlap: 10,
            chunk_size: 10
        })
    );
}

#[test]
fn prefers_paragraph_boundary() {
    let first = "a".repeat(70);
    let second = "b".repeat(70);
    let text = format!("{first}\n\n{second}");

    let chunks: Vec<&str> = split(&text, 100, 10).expect("split should succeed").collect();

    assert_eq!(chunks[0], format!("{first}\n\n"));
    assert_eq!(reconstruct(&chunks, 10), text);
}

#[test]
fn prefers_sentence_boundary_over_word() {
    let text = format!("{}. {} tail words here", "x".repeat(60), "y".repeat(30));
    let chunks: Vec<&str> = split(&text, 100, 5).expect("split should succeed").collect();

    assert!(chunks[0].ends_with(". "), "got {:?}", chunks[0]);
    assert_eq!(reconstruct(&chunks, 5), text);
}

#[test]
fn ignores_boundary_in_first_half_of_window() {
    let text = format!("ab\n\n{}", "c".repeat(200));
    let chunks: Vec<&str> = split(&text, 100, 10).expect("split should succeed").collect();

    assert_eq!(chunks[0].chars().count(), 100);
}

#[test]
fn arabic_text_respects_bounds_and_coverage() {
    let text = arabic_corpus();
    let chunks: Vec<&str> = split(&text, 200, 40).expect("split should succeed").collect();

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 200);
    }
    assert_eq!(reconstruct(&chunks, 40), text);
}

#[test]
fn coverage_holds_for_many_configurations() {
    let text = arabic_corpus();
    for (chunk_size, overlap) in [(1, 0), (7, 3), (50, 0), (64, 63), (333, 100)] {
        let chunks: Vec<&str> = split(&text, chunk_size, overlap)
            .expect("split should succeed")
            .collect();
        assert!(chunks.iter().all(|c| c.chars().count() <= chunk_size));
        assert_eq!(
            reconstruct(&chunks, overlap),
            text,
            "coverage broken for size {chunk_size} overlap {overlap}"
        );
    }
}

#[test]
fn iterator_is_restartable() {
    let text = "A".repeat(2500);
    let chunks = split(&text, 1000, 100).expect("split should succeed");
    let replay = chunks.clone();

    let first: Vec<&str> = chunks.collect();
    let second: Vec<&str> = replay.collect();
    assert_eq!(first, second);
}

#[test]
fn document_metadata_is_consistent() {
    let text = arabic_corpus();
    let config = ChunkingConfig {
        chunk_size: 300,
        chunk_overlap: 30,
    };

    let chunks = chunk_document("القيم/الفصل_الاول.txt", &text, &config)
        .expect("chunk_document should succeed");

    let total = chunks.len();
    assert!(total > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index(), i);
        assert_eq!(chunk.total_chunks(), total);
        assert_eq!(chunk.source_document_id(), "القيم/الفصل_الاول.txt");
    }
}

#[test]
fn empty_document_has_no_chunks() {
    let chunks = chunk_document("empty.txt", "   ", &ChunkingConfig::default())
        .expect("chunk_document should succeed");
    assert!(chunks.is_empty());
}

#[test]
fn chunk_construction_is_validated() {
    assert!(Chunk::new("text", "doc", 0, 1).is_ok());
    assert!(Chunk::new("text", "doc", 1, 1).is_err());
    assert!(Chunk::new("text", "", 0, 1).is_err());
    assert!(Chunk::new("", "doc", 0, 1).is_err());
}

#[test]
fn default_config_matches_ingestion_defaults() {
    let config = ChunkingConfig::default();
    assert_eq!(config.chunk_size, 1000);
    assert_eq!(config.chunk_overlap, 100);
    assert!(config.validate().is_ok());
}
