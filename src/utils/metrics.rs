use std::collections::HashSet;

/// Offline ranking-quality calculator backing the model validator.
#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    k: usize,
}

impl MetricsCalculator {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn hit_at_k(&self, recommended: &[String], target: &str) -> bool {
        recommended.iter().take(self.k).any(|p| p == target)
    }

    pub fn calculate_precision_at_k(&self, recommended: &[String], relevant: &[String]) -> f64 {
        if recommended.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<_> = relevant.iter().collect();
        let relevant_recommended = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        relevant_recommended as f64 / self.k.min(recommended.len()) as f64
    }

    pub fn calculate_recall_at_k(&self, recommended: &[String], relevant: &[String]) -> f64 {
        if relevant.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<_> = relevant.iter().collect();
        let relevant_recommended = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        relevant_recommended as f64 / relevant.len() as f64
    }

    pub fn calculate_f1_score(&self, precision: f64, recall: f64) -> f64 {
        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_precision_at_k() {
        let calculator = MetricsCalculator::new(3);
        let recommended = ids(&["p1", "p2", "p3"]);
        let relevant = ids(&["p1", "p3"]);
        let precision = calculator.calculate_precision_at_k(&recommended, &relevant);
        assert!((precision - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_recall_at_k() {
        let calculator = MetricsCalculator::new(3);
        let recommended = ids(&["p1", "p2", "p3"]);
        let relevant = ids(&["p1", "p3"]);
        let recall = calculator.calculate_recall_at_k(&recommended, &relevant);
        assert!((recall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_hit_at_k_respects_cutoff() {
        let calculator = MetricsCalculator::new(2);
        let recommended = ids(&["p1", "p2", "p3"]);
        assert!(calculator.hit_at_k(&recommended, "p2"));
        assert!(!calculator.hit_at_k(&recommended, "p3"));
    }

    #[test]
    fn test_f1_guards_zero_sum() {
        let calculator = MetricsCalculator::new(5);
        assert_eq!(calculator.calculate_f1_score(0.0, 0.0), 0.0);
        let f1 = calculator.calculate_f1_score(0.5, 1.0);
        assert!((f1 - 2.0 * 0.5 / 1.5).abs() < 1e-9);
    }
}
