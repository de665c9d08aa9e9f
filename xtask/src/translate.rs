use crate::{ModelArgs, VecOrRange};
use common::{clamp_to_vocab, utok, EOS};
use common_cpu::gather_rows;
use dl4mt::{Decoder, Dl4mtStorage, FusedGru, Gru, Matrix, ReferenceGru};
use log::{error, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use service::{Mode, Scheduler, SchedulerConfig, Sentence, SentenceBatch};
use std::{
    io::{self, stdin, BufRead},
    process::exit,
    sync::Arc,
    time::Instant,
};
use tokenizer::VocabTxt;

#[derive(Args)]
pub(crate) struct TranslateArgs {
    #[clap(flatten)]
    model: ModelArgs,
    /// Vocabulary file, one word per line.
    #[clap(long)]
    vocab: String,

    /// CPU worker threads.
    #[clap(long)]
    threads: Option<usize>,
    /// Accelerator devices, the format is "0,1" or "0..2".
    #[clap(long)]
    devices: Option<String>,
    /// Worker threads per device.
    #[clap(long)]
    threads_per_device: Option<usize>,
    /// Max sentences per batch.
    #[clap(long)]
    batch_size: Option<usize>,
    /// Translate one line at a time on the main thread.
    #[clap(long)]
    unbatched: bool,

    /// Use the unfused GRU.
    #[clap(long)]
    reference_gru: bool,
    /// Max words generated per sentence.
    #[clap(long)]
    max_len: Option<usize>,
}

impl TranslateArgs {
    pub fn run(self) {
        self.model.init_log();
        if self.reference_gru {
            self.typed::<ReferenceGru>()
        } else {
            self.typed::<FusedGru>()
        }
    }

    fn config(&self) -> SchedulerConfig {
        let default = SchedulerConfig::default();
        SchedulerConfig {
            cpu_threads: self.threads.unwrap_or(default.cpu_threads),
            devices: self
                .devices
                .as_deref()
                .map_or_else(Vec::new, |d| d.parse::<VecOrRange>().unwrap().into_vec()),
            threads_per_device: self.threads_per_device.unwrap_or(default.threads_per_device),
            max_batch_size: self.batch_size.unwrap_or(default.max_batch_size),
            mode: if self.unbatched {
                Mode::Unbatched
            } else {
                Mode::Batched
            },
        }
    }

    fn typed<G: Gru + 'static>(self) {
        let vocab = Arc::new(VocabTxt::from_txt_file(&self.vocab).unwrap());
        let meta = self.model.meta(vocab.len());
        info!("{meta:?}");

        let time = Instant::now();
        let model = Dl4mtStorage::random(meta.clone(), self.model.seed());
        let source = Arc::new(SourceTable::new(meta.nvoc, meta.dctx, self.model.seed()));
        info!("build model ... {:?}", time.elapsed());

        let max_len = self.max_len.unwrap_or(50);
        let mut scheduler = match Scheduler::new(self.config(), move |_| {
            (Decoder::<G>::new(&model), Greedy::default())
        }) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!("{e}");
                exit(1);
            }
        };

        let mut lines = InputLines::new(stdin().lock());
        let words = vocab.clone();
        let time = Instant::now();
        let ans = scheduler.translate(
            lines.by_ref(),
            &*vocab,
            move |(decoder, greedy), batch| greedy.translate(decoder, &source, batch, max_len),
        );
        drop(scheduler);

        match ans {
            Ok(ans) => {
                for ids in ans {
                    let line = ids.iter().map(|&id| words.decode(id)).collect::<Vec<_>>();
                    println!("{}", line.join(" "));
                }
                info!("total time: {:?}", time.elapsed());
            }
            Err(e) => {
                error!("{e}");
                exit(1);
            }
        }
        if let Some(e) = lines.error {
            error!("input stopped at line {}: {e}", lines.read + 1);
            exit(1);
        }
    }
}

/// Lines of the input up to the first read error, which is kept.
struct InputLines<R> {
    lines: io::Lines<R>,
    read: usize,
    error: Option<io::Error>,
}

impl<R: BufRead> InputLines<R> {
    fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            read: 0,
            error: None,
        }
    }
}

impl<R: BufRead> Iterator for InputLines<R> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        if self.error.is_some() {
            return None;
        }
        match self.lines.next()? {
            Ok(line) => {
                self.read += 1;
                Some(line)
            }
            Err(e) => {
                self.error = Some(e);
                None
            }
        }
    }
}

/// Stand-in for the encoder: one fixed random context row per source word.
struct SourceTable(Matrix);

impl SourceTable {
    fn new(nvoc: usize, dctx: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(1));
        Self(Matrix::from_fn(nvoc, dctx, |_, _| rng.gen_range(-1.0..1.0)))
    }

    fn encode(&self, context: &mut Matrix, sentence: &Sentence) {
        let ids = sentence
            .field(0)
            .iter()
            .map(|&id| clamp_to_vocab(id, self.0.rows()))
            .chain([EOS])
            .collect::<Vec<_>>();
        gather_rows(context, &self.0, &ids);
    }
}

/// Per-worker scratch of the greedy search.
#[derive(Default)]
struct Greedy {
    context: Matrix,
    state: Matrix,
    next: Matrix,
    embedding: Matrix,
}

impl Greedy {
    fn translate<G: Gru>(
        &mut self,
        decoder: &mut Decoder<G>,
        source: &SourceTable,
        batch: &SentenceBatch,
        max_len: usize,
    ) -> Vec<Vec<utok>> {
        decoder.unfilter();
        batch
            .iter()
            .map(|sentence| {
                source.encode(&mut self.context, sentence);
                decoder.empty_state(&mut self.state, &self.context, 1);
                decoder.empty_embedding(&mut self.embedding, 1);

                let mut ans = Vec::new();
                while ans.len() < max_len {
                    let probs = decoder.make_step(
                        &mut self.next,
                        &self.state,
                        &self.embedding,
                        &self.context,
                    );
                    let best = argmax(probs.row(0));
                    if best == EOS {
                        break;
                    }
                    ans.push(best);
                    decoder.lookup(&mut self.embedding, &[best]);
                    self.state.swap(&mut self.next);
                }
                ans
            })
            .collect()
    }
}

fn argmax(row: &[f32]) -> utok {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &p)| {
            if p > best.1 {
                (i, p)
            } else {
                best
            }
        })
        .0 as _
}

#[test]
fn test_greedy() {
    use dl4mt::Dl4mtMeta;

    let meta = Dl4mtMeta {
        nvoc: 12,
        demb: 4,
        dstate: 5,
        dctx: 6,
        datt: 3,
        dout: 4,
    };
    let model = Dl4mtStorage::random(meta, 3);
    let source = SourceTable::new(12, 6, 3);
    let vocab = VocabTxt::from_words((0..12).map(|i| format!("w{i}")));
    let batch = ["w2 w3", "w9 w50 w4 w4"]
        .iter()
        .enumerate()
        .map(|(i, line)| Sentence::new(i, line, &vocab))
        .collect::<SentenceBatch>();

    let mut decoder = Decoder::<FusedGru>::new(&model);
    let mut greedy = Greedy::default();
    let ans = greedy.translate(&mut decoder, &source, &batch, 7);
    assert_eq!(ans.len(), 2);
    assert!(ans.iter().all(|ids| ids.len() <= 7));
    assert!(ans.iter().flatten().all(|&id| id != EOS && (id as usize) < 12));

    let again = greedy.translate(&mut decoder, &source, &batch, 7);
    assert_eq!(ans, again);
}

#[test]
fn test_input_error() {
    let mut lines = InputLines::new(&b"a b\nc\n\xff\xfe\nd\n"[..]);
    assert_eq!(lines.by_ref().collect::<Vec<_>>(), ["a b", "c"]);
    assert_eq!(lines.read, 2);
    assert_eq!(
        lines.error.as_ref().map(io::Error::kind),
        Some(io::ErrorKind::InvalidData)
    );
    // nothing past the bad line
    assert_eq!(lines.next(), None);
}

#[test]
fn test_argmax() {
    assert_eq!(argmax(&[-3., -0.5, -2., -0.5]), 1);
    assert_eq!(argmax(&[f32::NEG_INFINITY, -1e9]), 1);
}
