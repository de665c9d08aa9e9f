use crate::{Alignment, Dl4mtStorage, Embeddings, FusedGru, Gru, RnnFinal, RnnHidden, Softmax};
use common::utok;
use log::debug;
use tensor::Matrix;

/// One step of the decoder, composed from its submodules.
///
/// Every matrix passed to a step has one row per hypothesis of the batch.
/// A decoder owns all of its scratch buffers; give each worker thread its own.
pub struct Decoder<G = FusedGru> {
    embeddings: Embeddings,
    rnn1: RnnHidden<G>,
    rnn2: RnnFinal<G>,
    alignment: Alignment,
    softmax: Softmax,

    hidden_state: Matrix,
    aligned_source_context: Matrix,
    probs: Matrix,
}

impl<G: Gru> Decoder<G> {
    pub fn new(model: &Dl4mtStorage) -> Self {
        model.check();
        debug!("build decoder {:?}", model.meta);
        Self {
            embeddings: Embeddings::new(&model.embeddings),
            rnn1: RnnHidden::new(&model.init, &model.gru1),
            rnn2: RnnFinal::new(&model.gru2),
            alignment: Alignment::new(&model.alignment),
            softmax: Softmax::new(&model.softmax),
            hidden_state: Matrix::default(),
            aligned_source_context: Matrix::default(),
            probs: Matrix::default(),
        }
    }

    /// Prepares a batch: writes its initial state and precomputes the
    /// attention projection of `source_context`. Call once per batch, before
    /// the first [`Decoder::make_step`].
    pub fn empty_state(&mut self, state: &mut Matrix, source_context: &Matrix, batch_size: usize) {
        self.rnn1.initialize_state(state, source_context, batch_size);
        self.alignment.init(source_context);
    }

    /// The all-zero embedding fed to the first step.
    pub fn empty_embedding(&self, embedding: &mut Matrix, batch_size: usize) {
        embedding.resize(batch_size, self.embeddings.cols());
        embedding.fill(0.);
    }

    /// Runs one step and returns the log-probabilities of the next word.
    ///
    /// The first recurrence reads the previous word, attention reads its
    /// output, and the second recurrence reads the attended context; the
    /// output layer sees the new state with the word and the context.
    ///
    /// `source_context` must be the one given to the last
    /// [`Decoder::empty_state`]. A context of another length panics; a
    /// different context of the same length is not detected and is scored
    /// against the projection of the old one.
    pub fn make_step(
        &mut self,
        next_state: &mut Matrix,
        state: &Matrix,
        embeddings: &Matrix,
        source_context: &Matrix,
    ) -> &Matrix {
        assert!(state.rows() > 0, "empty batch");
        assert_eq!(
            state.rows(),
            embeddings.rows(),
            "state {state:?} and embeddings {embeddings:?} of different batches",
        );

        self.rnn1
            .get_next_state(&mut self.hidden_state, state, embeddings);
        self.alignment.get_aligned_source_context(
            &mut self.aligned_source_context,
            &self.hidden_state,
            source_context,
        );
        self.rnn2.get_next_state(
            next_state,
            &self.hidden_state,
            &self.aligned_source_context,
        );
        self.softmax.get_probs(
            &mut self.probs,
            next_state,
            embeddings,
            &self.aligned_source_context,
        );
        &self.probs
    }

    /// Log-probabilities of the last step.
    #[inline]
    pub fn probs(&self) -> &Matrix {
        &self.probs
    }

    #[inline]
    pub fn lookup(&mut self, embedding: &mut Matrix, ids: &[utok]) {
        self.embeddings.lookup(embedding, ids)
    }

    #[inline]
    pub fn filter(&mut self, ids: &[utok]) {
        self.softmax.filter(ids)
    }

    #[inline]
    pub fn unfilter(&mut self) {
        self.softmax.unfilter()
    }

    /// Attention weights of the last step, shape: [batch, source length].
    #[inline]
    pub fn attention(&self) -> &Matrix {
        self.alignment.attention()
    }

    #[inline]
    pub fn copy_attention(&self, attention: &mut Matrix) {
        self.alignment.copy_attention(attention)
    }

    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.embeddings.rows()
    }
}
