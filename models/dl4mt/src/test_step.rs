use crate::{Decoder, Dl4mtMeta, Dl4mtStorage, FusedGru, Gru, GruWeights, ReferenceGru};
use common::UNK;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tensor::Matrix;

const META: Dl4mtMeta = Dl4mtMeta {
    nvoc: 40,
    demb: 8,
    dstate: 6,
    dctx: 12,
    datt: 10,
    dout: 8,
};

fn model() -> Dl4mtStorage {
    Dl4mtStorage::random(META, 2024)
}

fn source_context(rng: &mut StdRng, len: usize) -> Matrix {
    Matrix::from_fn(len, META.dctx, |_, _| rng.gen_range(-1.0..1.0))
}

fn assert_close(a: &Matrix, b: &Matrix, eps: f32) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        assert!((x - y).abs() <= eps, "{x} != {y}");
    }
}

#[test]
fn test_shapes() {
    fn shapes<G: Gru>() {
        let model = model();
        let mut decoder = Decoder::<G>::new(&model);
        assert_eq!(decoder.vocab_size(), META.nvoc);
        let mut rng = StdRng::seed_from_u64(0);

        for batch in 1..=4 {
            let context = source_context(&mut rng, 3 + batch);
            let mut state = Matrix::default();
            decoder.empty_state(&mut state, &context, batch);
            assert_eq!(state.shape(), (batch, META.dstate));

            let zero_state = Matrix::new(batch, META.dstate);
            let mut embedding = Matrix::new(1, 1);
            decoder.empty_embedding(&mut embedding, batch);
            assert_eq!(embedding.shape(), (batch, META.demb));
            assert!(embedding.as_slice().iter().all(|&x| x == 0.));

            let mut next = Matrix::default();
            let probs = decoder.make_step(&mut next, &zero_state, &embedding, &context);
            assert_eq!(probs.shape(), (batch, META.nvoc));
            assert_eq!(next.shape(), (batch, META.dstate));
            assert_eq!(decoder.attention().shape(), (batch, 3 + batch));
        }
    }
    shapes::<ReferenceGru>();
    shapes::<FusedGru>();
}

#[test]
fn test_distributions() {
    let model = model();
    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut rng = StdRng::seed_from_u64(1);

    for len in [1, 2, 9] {
        let context = source_context(&mut rng, len);
        let mut state = Matrix::default();
        let mut next = Matrix::default();
        let mut embedding = Matrix::default();
        decoder.empty_state(&mut state, &context, 3);
        decoder.lookup(&mut embedding, &[5, 7, 11]);

        for _ in 0..3 {
            let probs = decoder.make_step(&mut next, &state, &embedding, &context);
            for row in probs.iter_rows() {
                let sum = row.iter().map(|p| p.exp()).sum::<f32>();
                assert!((sum - 1.).abs() < 1e-5, "probs sum to {sum}");
            }
            for row in decoder.attention().iter_rows() {
                assert_eq!(row.len(), len);
                assert!(row.iter().all(|a| a.is_finite() && *a >= 0.));
                assert!((row.iter().sum::<f32>() - 1.).abs() < 1e-5);
            }
            state.swap(&mut next);
        }

        let mut attention = Matrix::default();
        decoder.copy_attention(&mut attention);
        assert_eq!(&attention, decoder.attention());
    }
}

#[test]
fn test_reference_and_fused_agree() {
    let model = model();
    let mut reference = Decoder::<ReferenceGru>::new(&model);
    let mut fused = Decoder::<FusedGru>::new(&model);
    let mut rng = StdRng::seed_from_u64(2);
    let context = source_context(&mut rng, 5);

    let mut state_r = Matrix::default();
    let mut state_f = Matrix::default();
    reference.empty_state(&mut state_r, &context, 2);
    fused.empty_state(&mut state_f, &context, 2);
    assert_eq!(state_r, state_f);

    let mut embedding = Matrix::default();
    fused.lookup(&mut embedding, &[3, 4]);
    let mut next_r = Matrix::default();
    let mut next_f = Matrix::default();
    for _ in 0..4 {
        let probs_r = reference.make_step(&mut next_r, &state_r, &embedding, &context);
        let probs_f = fused.make_step(&mut next_f, &state_f, &embedding, &context);
        assert_close(probs_r, probs_f, 1e-4);
        assert_close(&next_r, &next_f, 1e-4);
        state_r.swap(&mut next_r);
        state_f.swap(&mut next_f);
    }
}

#[test]
fn test_repeated_step() {
    let model = model();
    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut rng = StdRng::seed_from_u64(3);
    let context = source_context(&mut rng, 4);

    let mut state = Matrix::default();
    let mut embedding = Matrix::default();
    decoder.empty_state(&mut state, &context, 2);
    decoder.lookup(&mut embedding, &[9, 10]);

    let mut next = Matrix::default();
    let first = decoder
        .make_step(&mut next, &state, &embedding, &context)
        .clone();
    let first_next = next.clone();

    // a different, larger batch in between
    let mut big_state = Matrix::default();
    let mut big_embedding = Matrix::default();
    let big_context = source_context(&mut rng, 7);
    decoder.empty_state(&mut big_state, &big_context, 5);
    decoder.lookup(&mut big_embedding, &[1, 2, 3, 4, 5]);
    decoder.make_step(&mut Matrix::default(), &big_state, &big_embedding, &big_context);

    decoder.empty_state(&mut state, &context, 2);
    let again = decoder.make_step(&mut next, &state, &embedding, &context);
    assert_eq!(&first, again);
    assert_eq!(first_next, next);
}

#[test]
fn test_filter() {
    let model = model();
    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut rng = StdRng::seed_from_u64(4);
    let context = source_context(&mut rng, 6);

    let mut state = Matrix::default();
    let mut embedding = Matrix::default();
    let mut next = Matrix::default();
    decoder.empty_state(&mut state, &context, 2);
    decoder.lookup(&mut embedding, &[12, 30]);
    let full = decoder
        .make_step(&mut next, &state, &embedding, &context)
        .clone();

    let ids = [17, 0, 39, 5];
    decoder.filter(&[1, 2]);
    decoder.filter(&ids);
    let filtered = decoder
        .make_step(&mut next, &state, &embedding, &context)
        .clone();
    assert_eq!(filtered.shape(), (2, ids.len()));

    // the shortlist is normalized on its own; renormalizing the full
    // distribution over the same ids must give the same values
    for r in 0..2 {
        let picked = ids.map(|id| full[(r, id as usize)]);
        let max = picked.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = max + picked.iter().map(|x| (x - max).exp()).sum::<f32>().ln();
        for (c, x) in picked.iter().enumerate() {
            let expected = x - log_sum;
            assert!((filtered[(r, c)] - expected).abs() < 1e-4);
        }
    }

    decoder.unfilter();
    let restored = decoder.make_step(&mut next, &state, &embedding, &context);
    assert_close(restored, &full, 1e-6);
}

#[test]
#[should_panic(expected = "out of vocabulary")]
fn test_filter_out_of_vocab() {
    Decoder::<FusedGru>::new(&model()).filter(&[3, META.nvoc as _]);
}

#[test]
fn test_unknown_lookup() {
    let model = model();
    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut embedding = Matrix::default();
    decoder.lookup(&mut embedding, &[2, META.nvoc as _, u32::MAX]);
    assert_eq!(embedding.shape(), (3, META.demb));
    assert_eq!(embedding.row(0), model.embeddings.e.row(2));
    assert_eq!(embedding.row(1), model.embeddings.e.row(UNK as _));
    assert_eq!(embedding.row(2), model.embeddings.e.row(UNK as _));
}

#[test]
#[should_panic(expected = "empty batch")]
fn test_empty_batch() {
    let mut rng = StdRng::seed_from_u64(5);
    let context = source_context(&mut rng, 3);
    Decoder::<FusedGru>::new(&model()).empty_state(&mut Matrix::default(), &context, 0);
}

#[test]
#[should_panic(expected = "different batches")]
fn test_batch_mismatch() {
    let model = model();
    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut rng = StdRng::seed_from_u64(6);
    let context = source_context(&mut rng, 3);
    let mut state = Matrix::default();
    decoder.empty_state(&mut state, &context, 2);
    let mut embedding = Matrix::default();
    decoder.lookup(&mut embedding, &[1, 2, 3]);
    decoder.make_step(&mut Matrix::default(), &state, &embedding, &context);
}

#[test]
#[should_panic(expected = "not initialized")]
fn test_step_on_other_context() {
    let model = model();
    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut rng = StdRng::seed_from_u64(7);
    let context = source_context(&mut rng, 3);
    let other = source_context(&mut rng, 4);
    let mut state = Matrix::default();
    let mut embedding = Matrix::default();
    decoder.empty_state(&mut state, &context, 1);
    decoder.empty_embedding(&mut embedding, 1);
    decoder.make_step(&mut Matrix::default(), &state, &embedding, &other);
}

#[test]
fn test_step_on_same_length_context() {
    let model = model();
    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut rng = StdRng::seed_from_u64(9);
    let context = source_context(&mut rng, 4);
    let other = source_context(&mut rng, 4);
    let mut state = Matrix::default();
    let mut embedding = Matrix::default();
    let mut next = Matrix::default();
    decoder.empty_state(&mut state, &context, 1);
    decoder.empty_embedding(&mut embedding, 1);

    // runs, but still scores against the projection of `context`
    decoder.make_step(&mut next, &state, &embedding, &other);
    let stale = decoder.attention().clone();

    decoder.empty_state(&mut state, &other, 1);
    decoder.make_step(&mut next, &state, &embedding, &other);
    assert_ne!(&stale, decoder.attention());
}

/// `x · w` for a single row `x`.
fn row_mul(x: &[f32], w: &Matrix) -> Vec<f32> {
    assert_eq!(x.len(), w.rows());
    (0..w.cols())
        .map(|c| x.iter().enumerate().map(|(r, x)| x * w[(r, c)]).sum::<f32>())
        .collect()
}

fn plus(a: &[f32], b: &[f32]) -> Vec<f32> {
    a.iter().zip(b).map(|(a, b)| a + b).collect()
}

fn sigmoid(x: f32) -> f32 {
    1. / (1. + (-x).exp())
}

fn loop_gru(w: &GruWeights, state: &[f32], x: &[f32]) -> Vec<f32> {
    let d = state.len();
    let gates = plus(&plus(&row_mul(x, &w.w), w.b.as_slice()), &row_mul(state, &w.u));
    let hx = plus(&row_mul(x, &w.wx), w.bx1.as_slice());
    let hs = plus(&row_mul(state, &w.ux), w.bx2.as_slice());
    (0..d)
        .map(|i| {
            let r = sigmoid(gates[i]);
            let u = sigmoid(gates[d + i]);
            let h = (hx[i] + r * hs[i]).tanh();
            (1. - u) * h + u * state[i]
        })
        .collect()
}

/// One step of the model for a single hypothesis row, with plain loops.
/// Returns the next state, the attention weights and the log-probabilities.
fn loop_step(
    model: &Dl4mtStorage,
    state: &[f32],
    embedding: &[f32],
    context: &Matrix,
) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let hidden = loop_gru(&model.gru1, state, embedding);

    let att = &*model.alignment;
    let projected = plus(&row_mul(&hidden, &att.w), att.b.as_slice());
    let scores = context
        .iter_rows()
        .map(|row| {
            let scu = row_mul(row, &att.u);
            scu.iter()
                .zip(&projected)
                .zip(att.v.as_slice())
                .map(|((s, p), v)| v * (s + p).tanh())
                .sum::<f32>()
                + att.c[(0, 0)]
        })
        .collect::<Vec<_>>();
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum = scores.iter().map(|e| (e - max).exp()).sum::<f32>();
    let attention = scores
        .iter()
        .map(|e| (e - max).exp() / sum)
        .collect::<Vec<_>>();
    let mut aligned = vec![0.; context.cols()];
    for (a, row) in attention.iter().zip(context.iter_rows()) {
        for (x, c) in aligned.iter_mut().zip(row) {
            *x += a * c;
        }
    }

    let next = loop_gru(&model.gru2, &hidden, &aligned);

    let out = &*model.softmax;
    let t1 = plus(&row_mul(&next, &out.w1), out.b1.as_slice());
    let t2 = plus(&row_mul(embedding, &out.w2), out.b2.as_slice());
    let t3 = plus(&row_mul(&aligned, &out.w3), out.b3.as_slice());
    let t = plus(&plus(&t1, &t2), &t3)
        .into_iter()
        .map(f32::tanh)
        .collect::<Vec<_>>();
    let logits = plus(&row_mul(&t, &out.w4), out.b4.as_slice());
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum = max + logits.iter().map(|x| (x - max).exp()).sum::<f32>().ln();
    let probs = logits.iter().map(|x| x - log_sum).collect();

    (next, attention, probs)
}

fn assert_row_close(a: &[f32], b: &[f32], eps: f32) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= eps, "[{i}] {x} != {y}");
    }
}

#[test]
fn test_step_values() {
    fn check<G: Gru>() {
        let model = model();
        let mut decoder = Decoder::<G>::new(&model);
        let mut rng = StdRng::seed_from_u64(8);
        let context = source_context(&mut rng, 5);
        let ids = [4, 17, 33];

        // tanh(mean(context) · Wi + Bi), same for every row
        let mut mean = vec![0.; META.dctx];
        for row in context.iter_rows() {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x / 5.;
            }
        }
        let init = plus(&row_mul(&mean, &model.init.wi), model.init.bi.as_slice())
            .into_iter()
            .map(f32::tanh)
            .collect::<Vec<_>>();

        let mut state = Matrix::default();
        decoder.empty_state(&mut state, &context, ids.len());
        for row in state.iter_rows() {
            assert_row_close(row, &init, 1e-5);
        }

        let mut embedding = Matrix::default();
        decoder.lookup(&mut embedding, &ids);
        let mut expected_state = vec![init; ids.len()];
        let mut next = Matrix::default();

        // the second step starts from rows that already differ
        for _ in 0..2 {
            let probs = decoder
                .make_step(&mut next, &state, &embedding, &context)
                .clone();
            for (j, row_state) in expected_state.iter_mut().enumerate() {
                let (s, a, p) = loop_step(&model, row_state, embedding.row(j), &context);
                assert_row_close(decoder.attention().row(j), &a, 1e-5);
                assert_row_close(next.row(j), &s, 1e-4);
                assert_row_close(probs.row(j), &p, 1e-4);
                *row_state = s;
            }
            state.swap(&mut next);
        }
    }
    check::<ReferenceGru>();
    check::<FusedGru>();
}
