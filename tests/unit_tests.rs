// Unit tests for Vibe Match

use chrono::{Duration, Utc};

use vibe_match::core::{
    cosine_similarity, is_stale, matches_pool_query, rank_candidates, validate_embedding,
    window_cutoff, CosineScorer, SimilarityError,
};
use vibe_match::models::{
    CandidateStatus, Embedding, MatchResult, NewCandidate, SubmitSelfieResponse,
};
use vibe_match::services::{sweep, CandidateStore, CleanupPolicy, InMemoryCandidateStore};
use vibe_match::MatchError;

#[test]
fn test_cosine_identical_vectors() {
    let v = [0.2, -0.4, 0.9, 0.1];
    let score = cosine_similarity(&v, &v).unwrap();
    assert!((score - 1.0).abs() < 1e-9);
}

#[test]
fn test_cosine_exact_half() {
    let score = cosine_similarity(&[1.0, 1.0, 0.0, 0.0], &[1.0, 0.0, 1.0, 0.0]).unwrap();
    assert_eq!(score, 0.5);
}

#[test]
fn test_cosine_bounds() {
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0);
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]).unwrap(), -1.0);

    let a = [0.31, 0.77, -0.12];
    let b = [0.98, -0.05, 0.44];
    let score = cosine_similarity(&a, &b).unwrap();
    assert!((-1.0..=1.0).contains(&score));
    assert_eq!(score, cosine_similarity(&b, &a).unwrap());
}

#[test]
fn test_cosine_rejects_degenerate_input() {
    assert_eq!(
        cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]),
        Err(SimilarityError::DimensionMismatch { left: 2, right: 3 })
    );
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Err(SimilarityError::ZeroMagnitude));
    assert_eq!(cosine_similarity(&[], &[]), Err(SimilarityError::Empty));
    assert!(matches!(
        cosine_similarity(&[1.0, f32::INFINITY], &[1.0, 0.0]),
        Err(SimilarityError::NonFinite(1))
    ));
}

#[test]
fn test_validate_embedding_dimensions() {
    let embedding = Embedding::new(vec![0.5; 512]);
    assert!(validate_embedding(&embedding, Some(512)).is_ok());
    assert!(validate_embedding(&embedding, None).is_ok());
    assert_eq!(
        validate_embedding(&embedding, Some(768)),
        Err(SimilarityError::UnexpectedDimensions { expected: 768, actual: 512 })
    );
}

#[test]
fn test_pool_query_window_and_self_exclusion() {
    let now = Utc::now();
    let cutoff = window_cutoff(now, Duration::seconds(300));
    let at = |age: i64, user: &str| {
        NewCandidate::new(user, Embedding::new(vec![1.0]), now - Duration::seconds(age)).into_candidate()
    };

    assert!(matches_pool_query(&at(299, "bob"), "alice", CandidateStatus::Pending, cutoff));
    assert!(!matches_pool_query(&at(300, "bob"), "alice", CandidateStatus::Pending, cutoff));
    assert!(!matches_pool_query(&at(10, "alice"), "alice", CandidateStatus::Pending, cutoff));

    assert!(is_stale(&at(300, "bob"), cutoff));
    assert!(!is_stale(&at(299, "bob"), cutoff));
}

#[test]
fn test_rank_candidates_orders_best_first() {
    let now = Utc::now();
    let query = Embedding::new(vec![1.0, 0.0]);
    let pool = vec![
        NewCandidate::new("b", Embedding::new(vec![0.6, 0.8]), now).into_candidate(),
        NewCandidate::new("a", Embedding::new(vec![0.8, 0.6]), now).into_candidate(),
        NewCandidate::new("c", Embedding::new(vec![0.0, 1.0]), now).into_candidate(),
    ];

    let (ranked, skipped) = rank_candidates(&CosineScorer, &query, pool);
    let order: Vec<_> = ranked.iter().map(|s| s.candidate.user_id.as_str()).collect();

    assert_eq!(skipped, 0);
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn test_match_result_wire_shape() {
    let json = serde_json::to_value(MatchResult::NoMatch).unwrap();
    assert_eq!(json, serde_json::json!({ "matched": false }));

    let response = SubmitSelfieResponse::from(&MatchResult::NoMatch);
    assert!(!response.match_found);
}

#[test]
fn test_error_classification() {
    let err = MatchError::from(SimilarityError::ZeroMagnitude);
    assert!(err.is_caller_error());
    assert!(!err.is_retryable());
    assert_eq!(err.kind(), "invalid_embedding");

    let err = MatchError::StoreUnavailable("connection reset".into());
    assert!(err.is_retryable());
    assert!(err.to_response().retryable);
}

#[test]
fn test_sweep_without_retention_keeps_rows() {
    tokio_test::block_on(async {
        let store = InMemoryCandidateStore::new();
        let now = Utc::now();
        let selfie = Embedding::new(vec![1.0, 0.0]);

        store
            .insert(NewCandidate::new("fresh", selfie.clone(), now))
            .await
            .unwrap();
        store
            .insert(NewCandidate::new("stale", selfie.clone(), now - Duration::minutes(10)))
            .await
            .unwrap();
        store
            .insert(NewCandidate::new("ancient", selfie, now - Duration::days(3)))
            .await
            .unwrap();

        let policy = CleanupPolicy {
            interval: std::time::Duration::from_secs(60),
            window: Duration::seconds(300),
            retention: None,
        };
        let report = sweep(&store, &policy).await.unwrap();

        assert_eq!(report.expired, 2);
        assert_eq!(report.purged, 0);
        assert_eq!(store.len().await, 3);

        let expired = store
            .query("stale", CandidateStatus::Expired, now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].user_id, "ancient");
    });
}
