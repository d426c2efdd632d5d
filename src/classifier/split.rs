//! Deterministic fit/evaluation split of labeled examples.
//!
//! Stratifies by label when every label has at least two examples and both
//! subsets are large enough to hold one example per label; otherwise falls
//! back to a plain shuffled split. Either way, at least one example is fitted.

use rand::SeedableRng;
use rand::seq::SliceRandom;

/// Seed used for reproducible splits.
pub const DEFAULT_SPLIT_SEED: u64 = 42;

/// Indices into the example list, each subset in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub fit: Vec<usize>,
    pub eval: Vec<usize>,
    /// Whether the split was stratified by label.
    pub stratified: bool,
}

/// Number of examples held out for `fraction` of `n`.
pub fn eval_size(n: usize, fraction: f32) -> usize {
    if n < 2 || fraction <= 0.0 {
        return 0;
    }
    // Tolerance absorbs f32 representation error (0.3f32 * 10 > 3).
    let wanted = (fraction as f64 * n as f64 - 1e-6).ceil() as usize;
    wanted.min(n - 1)
}

/// Split `labels.len()` examples into fit and evaluation subsets.
pub fn train_eval_split(labels: &[String], fraction: f32, seed: u64) -> Split {
    let n = labels.len();
    let n_eval = eval_size(n, fraction);
    if n_eval == 0 {
        return Split {
            fit: (0..n).collect(),
            eval: Vec::new(),
            stratified: false,
        };
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let classes = group_by_label(labels);

    let eval = match stratified_eval(&classes, n, n_eval, &mut rng) {
        Some(eval) => eval,
        None => {
            tracing::debug!(
                classes = classes.len(),
                n_eval,
                "stratified split not possible, using unstratified split"
            );
            let mut indices: Vec<usize> = (0..n).collect();
            indices.shuffle(&mut rng);
            let mut eval = indices[..n_eval].to_vec();
            eval.sort_unstable();
            return Split {
                fit: complement(n, &eval),
                eval,
                stratified: false,
            };
        }
    };

    Split {
        fit: complement(n, &eval),
        eval,
        stratified: true,
    }
}

/// Example indices per label, labels in order of first appearance.
fn group_by_label(labels: &[String]) -> Vec<Vec<usize>> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, label) in labels.iter().enumerate() {
        match order.iter().position(|l| *l == label.as_str()) {
            Some(g) => groups[g].push(i),
            None => {
                order.push(label.as_str());
                groups.push(vec![i]);
            }
        }
    }
    groups
}

fn stratified_eval(
    classes: &[Vec<usize>],
    n: usize,
    n_eval: usize,
    rng: &mut rand::rngs::StdRng,
) -> Option<Vec<usize>> {
    let k = classes.len();
    if classes.iter().any(|c| c.len() < 2) || n_eval < k || n - n_eval < k {
        return None;
    }

    // Proportional allocation, at least one held out and one kept per class.
    let mut alloc: Vec<usize> = Vec::with_capacity(k);
    let mut remainders: Vec<(f64, usize)> = Vec::with_capacity(k);
    for (ci, members) in classes.iter().enumerate() {
        let exact = n_eval as f64 * members.len() as f64 / n as f64;
        let base = (exact.floor() as usize).clamp(1, members.len() - 1);
        alloc.push(base);
        remainders.push((exact - exact.floor(), ci));
    }

    let mut assigned: usize = alloc.iter().sum();
    // Largest remainder first; ties keep label order.
    remainders.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    while assigned < n_eval {
        let before = assigned;
        for &(_, ci) in &remainders {
            if assigned == n_eval {
                break;
            }
            if alloc[ci] < classes[ci].len() - 1 {
                alloc[ci] += 1;
                assigned += 1;
            }
        }
        if assigned == before {
            break;
        }
    }
    while assigned > n_eval {
        let before = assigned;
        for &(_, ci) in remainders.iter().rev() {
            if assigned == n_eval {
                break;
            }
            if alloc[ci] > 1 {
                alloc[ci] -= 1;
                assigned -= 1;
            }
        }
        if assigned == before {
            break;
        }
    }
    if assigned != n_eval {
        return None;
    }

    let mut eval = Vec::with_capacity(n_eval);
    for (members, &take) in classes.iter().zip(&alloc) {
        let mut shuffled = members.clone();
        shuffled.shuffle(rng);
        eval.extend_from_slice(&shuffled[..take]);
    }
    eval.sort_unstable();
    Some(eval)
}

fn complement(n: usize, eval: &[usize]) -> Vec<usize> {
    (0..n).filter(|i| eval.binary_search(i).is_err()).collect()
}
