use super::*;

fn chunk(doc: &str, index: usize, total: usize) -> Chunk {
    Chunk::new(format!("{doc} chunk {index}"), doc, index, total).expect("valid chunk")
}

/// Unit vector in the plane whose cosine with [1, 0] is `similarity`
fn with_similarity(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).sqrt()]
}

fn populated_index() -> VectorIndex {
    let mut index = VectorIndex::new();
    index
        .add(vec![
            (with_similarity(0.9), chunk("a.txt", 0, 3)),
            (with_similarity(0.5), chunk("a.txt", 1, 3)),
            (with_similarity(0.7), chunk("a.txt", 2, 3)),
        ])
        .expect("add should succeed");
    index
}

#[test]
fn search_returns_best_first() {
    let index = populated_index();

    let hits = index.search(&[1.0, 0.0], 2).expect("search should succeed");

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].entry.chunk.chunk_index(), 0);
    assert_eq!(hits[1].entry.chunk.chunk_index(), 2);
    assert!((hits[0].score - 0.9).abs() < 1e-6);
    assert!((hits[1].score - 0.7).abs() < 1e-6);
}

#[test]
fn k_larger_than_index_returns_everything_sorted() {
    let index = populated_index();

    let hits = index.search(&[1.0, 0.0], 10).expect("search should succeed");

    assert_eq!(hits.len(), 3);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn ties_keep_insertion_order() {
    let mut index = VectorIndex::new();
    index
        .add(vec![
            (vec![0.0, 1.0], chunk("low.txt", 0, 1)),
            (vec![2.0, 0.0], chunk("first.txt", 0, 1)),
            (vec![1.0, 0.0], chunk("second.txt", 0, 1)),
            (vec![5.0, 0.0], chunk("third.txt", 0, 1)),
        ])
        .expect("add should succeed");

    let hits = index.search(&[3.0, 0.0], 3).expect("search should succeed");
    let docs: Vec<&str> = hits
        .iter()
        .map(|h| h.entry.chunk.source_document_id())
        .collect();
    assert_eq!(docs, vec!["first.txt", "second.txt", "third.txt"]);
}

#[test]
fn first_add_fixes_dimension() {
    let mut index = populated_index();
    assert_eq!(index.dimension(), Some(2));

    let before = index.clone();
    let result = index.add(vec![
        (vec![1.0, 0.0], chunk("b.txt", 0, 2)),
        (vec![1.0, 0.0, 0.0], chunk("b.txt", 1, 2)),
    ]);

    assert!(matches!(
        result,
        Err(IndexError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    assert_eq!(index, before);
}

#[test]
fn rejects_non_finite_and_empty_vectors() {
    let mut index = VectorIndex::new();
    assert!(matches!(
        index.add(vec![(vec![f32::NAN, 1.0], chunk("a.txt", 0, 1))]),
        Err(IndexError::InvalidVector(_))
    ));
    assert!(matches!(
        index.add(vec![(Vec::new(), chunk("a.txt", 0, 1))]),
        Err(IndexError::InvalidVector(_))
    ));
    assert!(index.is_empty());
    assert_eq!(index.dimension(), None);
}

#[test]
fn empty_batch_is_a_no_op() {
    let mut index = VectorIndex::new();
    let ids = index.add(Vec::new()).expect("empty add should succeed");
    assert!(ids.is_empty());
    assert_eq!(index.dimension(), None);
}

#[test]
fn add_assigns_unique_ids() {
    let mut index = VectorIndex::new();
    let ids = index
        .add(vec![
            (vec![1.0], chunk("a.txt", 0, 2)),
            (vec![2.0], chunk("a.txt", 1, 2)),
        ])
        .expect("add should succeed");

    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(index.entries()[1].id, ids[1]);
}

#[test]
fn search_errors() {
    let empty = VectorIndex::new();
    assert!(matches!(
        empty.search(&[1.0, 0.0], 1),
        Err(IndexError::EmptyIndex)
    ));

    let index = populated_index();
    assert!(matches!(
        index.search(&[1.0, 0.0], 0),
        Err(IndexError::InvalidTopK(0))
    ));
    assert!(matches!(
        index.search(&[1.0], 1),
        Err(IndexError::DimensionMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[test]
fn zero_vectors_score_zero() {
    let mut index = VectorIndex::new();
    index
        .add(vec![
            (vec![0.0, 0.0], chunk("zero.txt", 0, 1)),
            (vec![-1.0, 0.0], chunk("opposite.txt", 0, 1)),
        ])
        .expect("add should succeed");

    let hits = index.search(&[1.0, 0.0], 2).expect("search should succeed");
    assert_eq!(hits[0].entry.chunk.source_document_id(), "zero.txt");
    assert!(hits[0].score.abs() < f32::EPSILON);
    assert!((hits[1].score + 1.0).abs() < 1e-6);
}

#[test]
fn clear_releases_dimension() {
    let mut index = populated_index();
    index.clear();

    assert!(index.is_empty());
    assert_eq!(index.dimension(), None);
    index
        .add(vec![(vec![1.0, 2.0, 3.0], chunk("c.txt", 0, 1))])
        .expect("add after clear should accept a new dimension");
    assert_eq!(index.dimension(), Some(3));
}

#[test]
fn restore_rejects_inconsistent_entries() {
    let index = populated_index();
    let mut entries = index.entries().to_vec();
    entries[1].vector.push(0.0);

    assert!(VectorIndex::restore(Some(2), entries).is_err());

    let mut duplicated = index.entries().to_vec();
    duplicated[2].id = duplicated[0].id;
    assert!(VectorIndex::restore(Some(2), duplicated).is_err());
}

#[test]
fn restore_preserves_search_results() {
    let index = populated_index();
    let restored =
        VectorIndex::restore(index.dimension(), index.entries().to_vec()).expect("restore");

    let query = [0.3, 0.8];
    assert_eq!(
        index.search(&query, 3).expect("search"),
        restored.search(&query, 3).expect("search")
    );
}

#[test]
fn document_count_counts_distinct_sources() {
    let mut index = populated_index();
    index
        .add(vec![(vec![0.1, 0.2], chunk("b.txt", 0, 1))])
        .expect("add should succeed");

    assert_eq!(index.document_count(), 2);
}

#[test]
fn large_finite_components_score_correctly() {
    let mut index = VectorIndex::new();
    index
        .add(vec![
            (vec![0.0, 1.0], chunk("small.txt", 0, 1)),
            (vec![3e19, 3e19], chunk("big.txt", 0, 1)),
        ])
        .expect("finite vectors should be accepted");

    let hits = index.search(&[1.0, 0.0], 2).expect("search should succeed");

    assert_eq!(hits[0].entry.chunk.source_document_id(), "big.txt");
    assert!((hits[0].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    assert!(hits[1].score.abs() < 1e-6);
}
