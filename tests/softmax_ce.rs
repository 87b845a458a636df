use mnistmodel::math::{self, Matrix};

fn manual_softmax_ce(logits: &[f32], target: usize) -> (f32, Vec<f32>, usize) {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut exp_sum = 0.0f32;
    let mut probs = vec![0f32; logits.len()];
    for (i, &v) in logits.iter().enumerate() {
        let e = (v - max).exp();
        probs[i] = e;
        exp_sum += e;
    }
    for p in &mut probs {
        *p /= exp_sum;
    }
    let loss = -probs[target].ln();
    let mut grad = probs.clone();
    grad[target] -= 1.0;
    let mut pred = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &p) in probs.iter().enumerate() {
        if p > best_val {
            best_val = p;
            pred = i;
        }
    }
    (loss, grad, pred)
}

#[test]
fn softmax_ce_matches_manual() {
    let logits_vec = vec![1.0, 2.0, 0.5];
    let logits = Matrix::from_vec(1, 3, logits_vec.clone());
    let target = 1usize;

    let (loss, grad, pred) = manual_softmax_ce(&logits_vec, target);
    let (loss2, grad_m, probs) = math::softmax_cross_entropy(&logits, &[target]);

    assert!((loss - loss2).abs() < 1e-6);
    for (a, b) in grad.iter().zip(grad_m.data.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
    assert_eq!(probs.argmax_rows()[0], pred);
}

#[test]
fn batch_loss_is_mean_and_grad_is_scaled() {
    let rows = [vec![1.0, 2.0, 0.5], vec![0.0, 0.0, 3.0]];
    let targets = [1usize, 0];
    let logits = Matrix::from_vec(2, 3, rows.concat());
    let (loss, grad, _) = math::softmax_cross_entropy(&logits, &targets);

    let (l0, g0, _) = manual_softmax_ce(&rows[0], targets[0]);
    let (l1, g1, _) = manual_softmax_ce(&rows[1], targets[1]);
    assert!((loss - (l0 + l1) / 2.0).abs() < 1e-5);
    for (a, b) in g0.iter().chain(g1.iter()).zip(grad.data.iter()) {
        assert!((a / 2.0 - b).abs() < 1e-6);
    }
}

#[test]
fn one_hot_loss_matches_index_loss() {
    let logits = Matrix::from_vec(2, 3, vec![0.2, 0.1, -1.0, 3.0, 0.0, 1.0]);
    let labels = [2u8, 0];
    let onehot = math::one_hot(&labels, 3);
    let probs = logits.softmax();
    let manual: f32 = (0..2)
        .map(|r| {
            -(0..3)
                .map(|c| onehot.get(r, c) * probs.get(r, c).ln())
                .sum::<f32>()
        })
        .sum::<f32>()
        / 2.0;
    let (loss, _, _) = math::softmax_cross_entropy(&logits, &[2, 0]);
    assert!((loss - manual).abs() < 1e-5);
}

#[test]
fn argmax_matches_manual() {
    let v = vec![0.1, 0.9, 0.2];
    assert_eq!(math::argmax(&v), 1);
}
