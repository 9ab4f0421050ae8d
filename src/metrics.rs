/// Fraction of positions where `predictions[i] == labels[i]`.
/// Returns `0.0` for empty input.
pub fn accuracy(predictions: &[usize], labels: &[usize]) -> f64 {
    let n = predictions.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
    correct as f64 / n as f64
}

/// `matrix[label][prediction]` counts. Indices outside `num_classes` are
/// skipped.
pub fn confusion_matrix(labels: &[usize], predictions: &[usize], num_classes: usize) -> Vec<Vec<usize>> {
    let mut matrix = vec![vec![0; num_classes]; num_classes];
    for (&l, &p) in labels.iter().zip(predictions) {
        if l < num_classes && p < num_classes {
            matrix[l][p] += 1;
        }
    }
    matrix
}

/// Accuracy restricted to each true class. Classes with no samples get
/// `None`.
pub fn per_class_accuracy(labels: &[usize], predictions: &[usize], num_classes: usize) -> Vec<Option<f64>> {
    confusion_matrix(labels, predictions, num_classes)
        .iter()
        .enumerate()
        .map(|(class, row)| {
            let total: usize = row.iter().sum();
            (total > 0).then(|| row[class] as f64 / total as f64)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_counts_matches() {
        assert_eq!(accuracy(&[1, 2, 3, 4], &[1, 2, 0, 4]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn confusion_rows_are_true_labels() {
        let labels = [0, 0, 1, 2, 2, 2];
        let preds = [0, 1, 1, 2, 2, 0];
        let m = confusion_matrix(&labels, &preds, 3);
        assert_eq!(m, vec![vec![1, 1, 0], vec![0, 1, 0], vec![1, 0, 2]]);

        let per_class = per_class_accuracy(&labels, &preds, 4);
        assert_eq!(per_class[0], Some(0.5));
        assert_eq!(per_class[1], Some(1.0));
        assert!((per_class[2].unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(per_class[3], None);
    }
}
