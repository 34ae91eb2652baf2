use rstest::*;
use sectionlens::similarity::{cosine_similarity, histogram_similarity};
use sectionlens::{SearchOptions, SectionRecord, SectionType, rank};
use serde_json::json;

fn record(url: &str, layout: &[f32], color: &[f32]) -> SectionRecord {
    SectionRecord {
        id: None,
        source_screen_id: None,
        section: SectionType::Testimonials,
        site_url: "example.com".into(),
        image_url: url.into(),
        layout_fingerprint: layout.to_vec(),
        color_fingerprint: color.to_vec(),
        layout_description: json!({"rows": []}),
        related_ids: None,
    }
}

fn urls(ranked: &[sectionlens::RankedResult]) -> Vec<String> {
    ranked.iter().map(|r| r.record.image_url.clone()).collect()
}

#[fixture]
fn pool() -> Vec<SectionRecord> {
    vec![
        record("a.png", &[0.9, 0.1, 0.0], &[0.2, 0.8, 0.0]),
        record("b.png", &[0.1, 0.9, 0.3], &[0.5, 0.5, 0.0]),
        record("c.png", &[0.5, 0.5, 0.5], &[0.0, 0.1, 0.9]),
        record("d.png", &[0.0, 0.0, 1.0], &[0.6, 0.4, 0.0]),
    ]
}

#[test]
fn scenario_layout_only() {
    let target = record("t.png", &[1., 0., 0.], &[1., 0., 0.]);
    let candidates =
        vec![record("one.png", &[1., 0., 0.], &[0., 1., 0.]), record("two.png", &[0., 1., 0.], &[1., 0., 0.])];
    let ranked = rank(&target, &candidates, &SearchOptions::layout_only()).unwrap();

    assert_eq!(urls(&ranked), ["one.png", "two.png"]);
    assert!((ranked[0].combined_score - 1.0).abs() < 1e-9);
    assert!(ranked[1].combined_score.abs() < 1e-9);
    assert_eq!(ranked[0].color_score, None);
}

#[test]
fn scenario_histograms() {
    let a = vec![1.0 / 512.0; 512];
    assert!((histogram_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-12);

    let mut b = a.clone();
    b[17] += 0.5;
    let sim = histogram_similarity(&a, &b).unwrap();
    assert!(sim < 1.0 && sim > 0.0);
}

#[rstest]
#[case(&[1., 2., 3.])]
#[case(&[0.001, 0.0, 0.0])]
#[case(&[-4., 5., 0.5, 100.])]
fn cosine_self_is_one(#[case] v: &[f32]) {
    assert!((cosine_similarity(v, v).unwrap() - 1.0).abs() < 1e-9);
}

#[rstest]
#[case(&[0.25, 0.25, 0.5], &[0.5, 0.5, 0.0])]
#[case(&[0.0, 0.0, 1.0], &[1.0, 0.0, 0.0])]
#[case(&[0.1, 0.2, 0.7], &[0.1, 0.2, 0.7])]
fn histogram_bounded(#[case] a: &[f32], #[case] b: &[f32]) {
    assert!((histogram_similarity(a, a).unwrap() - 1.0).abs() < 1e-12);
    let sim = histogram_similarity(a, b).unwrap();
    assert!(sim <= 1.0 && sim > 0.0);
}

#[rstest]
#[case(0.0, 1.0)]
#[case(0.3, 0.7)]
#[case(5.0, -2.0)]
fn single_modality_ignores_weights(pool: Vec<SectionRecord>, #[case] wl: f64, #[case] wc: f64) {
    let target = record("t.png", &[1., 0.2, 0.], &[0.3, 0.7, 0.]);

    let options = SearchOptions { include_color: false, layout_weight: wl, color_weight: wc, ..Default::default() };
    for r in rank(&target, &pool, &options).unwrap() {
        assert_eq!(Some(r.combined_score), r.layout_score);
        assert_eq!(r.color_score, None);
    }

    let options = SearchOptions { include_layout: false, layout_weight: wl, color_weight: wc, ..Default::default() };
    for r in rank(&target, &pool, &options).unwrap() {
        assert_eq!(Some(r.combined_score), r.color_score);
        assert_eq!(r.layout_score, None);
    }
}

#[rstest]
fn both_modalities_weighted(pool: Vec<SectionRecord>) {
    let target = record("t.png", &[1., 0.2, 0.], &[0.3, 0.7, 0.]);
    let options = SearchOptions { layout_weight: 0.7, color_weight: 0.3, ..Default::default() };
    let ranked = rank(&target, &pool, &options).unwrap();
    for r in &ranked {
        let expected = r.layout_score.unwrap() * 0.7 + r.color_score.unwrap() * 0.3;
        assert!((r.combined_score - expected).abs() < 1e-12);
    }
    assert!(ranked.windows(2).all(|w| w[0].combined_score >= w[1].combined_score));
}

#[rstest]
fn target_is_excluded(pool: Vec<SectionRecord>) {
    let target = pool[2].clone();
    let ranked = rank(&target, &pool, &SearchOptions::default()).unwrap();
    assert_eq!(ranked.len(), pool.len() - 1);
    assert!(ranked.iter().all(|r| r.record.image_url != "c.png"));
}

#[rstest]
fn rank_is_idempotent(pool: Vec<SectionRecord>) {
    let target = record("t.png", &[0.4, 0.4, 0.2], &[0.3, 0.3, 0.4]);
    let first = rank(&target, &pool, &SearchOptions::default()).unwrap();
    let second = rank(&target, &pool, &SearchOptions::default()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn ties_keep_input_order() {
    let target = record("t.png", &[1., 0.], &[1., 0.]);
    let candidates: Vec<_> = (0..20)
        .map(|i| record(&format!("{i}.png"), &[2., 0.], &[1., 0.]))
        .collect();
    let ranked = rank(&target, &candidates, &SearchOptions::default()).unwrap();
    let expected: Vec<_> = (0..20).map(|i| format!("{i}.png")).collect();
    assert_eq!(urls(&ranked), expected);
}

#[rstest]
fn no_modality_scores_zero(pool: Vec<SectionRecord>) {
    let target = record("t.png", &[1., 0., 0.], &[1., 0., 0.]);
    let options = SearchOptions { include_layout: false, include_color: false, ..Default::default() };
    let ranked = rank(&target, &pool, &options).unwrap();
    assert!(ranked.iter().all(|r| r.combined_score == 0.0));
    assert_eq!(urls(&ranked), ["a.png", "b.png", "c.png", "d.png"]);
}

#[test]
fn mismatched_dimensions_fail() {
    let target = record("t.png", &[1., 0.], &[1., 0.]);
    let candidates = vec![record("x.png", &[1., 0., 0.], &[1., 0.])];
    let err = rank(&target, &candidates, &SearchOptions::default()).unwrap_err();
    assert!(matches!(err, sectionlens::Error::DimensionMismatch { left: 2, right: 3 }));
}
