use crate::data::Data;
use log::{info, warn};
use statrs::statistics::Statistics;

/// Rank genes by sample variance across specimens (descending) and keep the
/// top `n` names. Ties are broken lexicographically by gene name so that
/// re-selecting from the same matrix is fully deterministic.
///
/// The returned ordering is frozen into the model: coefficient vectors and the
/// persisted gene table follow it exactly.
pub fn select_top_genes(data: &Data, n: usize) -> Vec<String> {
    let mut ranked: Vec<(f64, &str)> = (0..data.gene_len)
        .map(|j| {
            let column: Vec<f64> = (0..data.specimen_len).map(|i| data.row(i)[j]).collect();
            (column.variance(), data.genes[j].as_str())
        })
        .collect();

    ranked.sort_by(|a, b| match b.0.partial_cmp(&a.0) {
        Some(std::cmp::Ordering::Equal) | None => a.1.cmp(b.1),
        Some(ordering) => ordering,
    });

    let kept = if n > ranked.len() {
        warn!(
            "Only {} genes available, fewer than the {} requested. All genes kept.",
            ranked.len(),
            n
        );
        ranked.len()
    } else {
        n
    };

    info!("{} genes selected by variance", kept);
    ranked.truncate(kept);
    ranked.into_iter().map(|(_, name)| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Data;

    fn three_by_five() -> Data {
        // 3 specimens x 5 genes; variance ranking known in advance:
        // w (9.0) > x (0.75) > z (~0.58) > v (~0.08) > u (0)
        Data {
            X: vec![
                2.0, 0.0, 1.0, 0.5, 1.0, // A
                2.0, 3.0, 2.5, 1.0, 1.5, // B
                2.0, 6.0, 1.0, 2.0, 1.0, // C
            ],
            specimens: vec!["A".into(), "B".into(), "C".into()],
            genes: vec!["u".into(), "w".into(), "x".into(), "z".into(), "v".into()],
            aucs: Vec::new(),
            specimen_len: 3,
            gene_len: 5,
        }
    }

    #[test]
    fn test_top_two_genes_by_known_variance() {
        let mut data = three_by_five();
        // make v the clear winner: values 0 / 6 / 0 -> variance 12
        let v = 4;
        data.X[0 * 5 + v] = 0.0;
        data.X[1 * 5 + v] = 6.0;
        data.X[2 * 5 + v] = 0.0;

        let selected = select_top_genes(&data, 2);
        assert_eq!(selected, vec!["v", "w"],
        "top-2 selection must return exactly the two highest-variance gene identifiers, highest first");
    }

    #[test]
    fn test_selection_is_deterministic() {
        let data = three_by_five();
        let first = select_top_genes(&data, 4);
        let second = select_top_genes(&data, 4);
        assert_eq!(first, second,
        "re-selecting genes from the same input matrix must yield the same ordered list");
    }

    #[test]
    fn test_ties_break_lexicographically() {
        let data = Data {
            X: vec![
                0.0, 0.0, 0.0, //
                1.0, 1.0, 1.0, //
            ],
            specimens: vec!["A".into(), "B".into()],
            genes: vec!["gene_c".into(), "gene_a".into(), "gene_b".into()],
            aucs: Vec::new(),
            specimen_len: 2,
            gene_len: 3,
        };
        let selected = select_top_genes(&data, 3);
        assert_eq!(selected, vec!["gene_a", "gene_b", "gene_c"],
        "equal variances must order lexicographically by gene name");
    }

    #[test]
    fn test_requesting_more_genes_than_available_keeps_all() {
        let data = three_by_five();
        let selected = select_top_genes(&data, 100);
        assert_eq!(selected.len(), 5,
        "asking for more genes than exist should keep every gene instead of failing");
    }
}
