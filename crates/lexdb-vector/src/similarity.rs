use lexdb_core::types::{Metric, QueryHit};

/// Cosine similarity; 0.0 when either side has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// Higher is better under every metric.
pub fn score(metric: Metric, query: &[f32], candidate: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(query, candidate),
        Metric::L2 => -l2_distance(query, candidate),
    }
}

/// Order `(hit, seq)` pairs by score descending then insertion order, keep `k`.
pub fn rank(mut scored: Vec<(QueryHit, i64)>, k: usize) -> Vec<QueryHit> {
    scored.sort_by(|(a, sa), (b, sb)| b.score.total_cmp(&a.score).then(sa.cmp(sb)));
    scored.truncate(k);
    scored.into_iter().map(|(hit, _)| hit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexdb_core::types::ChunkMetadata;

    fn hit(id: &str, score: f32) -> QueryHit {
        QueryHit {
            id: id.into(),
            document: String::new(),
            metadata: ChunkMetadata {
                source: "s".into(),
                act_title: "a".into(),
                section_name: "n".into(),
                section_number: "1".into(),
            },
            score,
        }
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_score_is_negated_distance() {
        assert!((score(Metric::L2, &[0.0, 0.0], &[3.0, 4.0]) + 5.0).abs() < 1e-6);
    }

    #[test]
    fn rank_breaks_ties_by_sequence() {
        let ranked = rank(vec![(hit("late", 0.5), 7), (hit("best", 0.9), 9), (hit("early", 0.5), 2)], 2);
        let ids: Vec<_> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["best", "early"]);
    }
}
