use crate::ModelArgs;
use dl4mt::{Dl4mtStorage, FusedGru, Gru, Matrix, ReferenceGru};
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{Duration, Instant};

#[derive(Args)]
pub(crate) struct CheckGruArgs {
    #[clap(flatten)]
    model: ModelArgs,
    /// Rows of the state.
    #[clap(long)]
    batch_size: Option<usize>,
    /// Steps timed per implementation.
    #[clap(long)]
    steps: Option<usize>,
}

impl CheckGruArgs {
    pub fn run(self) {
        self.model.init_log();
        let meta = self.model.meta(64);
        let batch = self.batch_size.unwrap_or(8);
        let steps = self.steps.unwrap_or(100);
        let model = Dl4mtStorage::random(meta.clone(), self.model.seed());

        let mut rng = StdRng::seed_from_u64(self.model.seed());
        let state = Matrix::from_fn(batch, meta.dstate, |_, _| rng.gen_range(-1.0..1.0));
        let context = Matrix::from_fn(batch, meta.dctx, |_, _| rng.gen_range(-1.0..1.0));

        let mut reference = ReferenceGru::new(&model.gru2);
        let mut fused = FusedGru::new(&model.gru2);
        let (a, time_reference) = time(&mut reference, &state, &context, steps);
        let (b, time_fused) = time(&mut fused, &state, &context, steps);
        debug!("reference: {a}");
        debug!("fused: {b}");

        let diff = a
            .as_slice()
            .iter()
            .zip(b.as_slice())
            .map(|(x, y)| (x - y).abs())
            .fold(0f32, f32::max);
        info!("reference gru: {time_reference:?} per step");
        info!("fused gru: {time_fused:?} per step");
        println!("max difference: {diff:e}");
    }
}

fn time(gru: &mut impl Gru, state: &Matrix, context: &Matrix, steps: usize) -> (Matrix, Duration) {
    let mut next = Matrix::default();
    let start = Instant::now();
    for _ in 0..steps.max(1) {
        gru.next_state(&mut next, state, context);
    }
    (next, start.elapsed() / steps.max(1) as u32)
}
