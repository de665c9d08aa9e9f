use crate::Dl4mtMeta;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tensor::Matrix;

/// shape: [nvoc, demb]
pub struct EmbeddingWeights {
    pub e: Matrix,
}

pub struct InitWeights {
    /// shape: [dctx, dstate]
    pub wi: Matrix,
    /// shape: [1, dstate]
    pub bi: Matrix,
}

/// Gate columns are laid out `[reset | update]`.
pub struct GruWeights {
    /// shape: [din, 2 x dstate]
    pub w: Matrix,
    /// shape: [1, 2 x dstate]
    pub b: Matrix,
    /// shape: [dstate, 2 x dstate]
    pub u: Matrix,
    /// shape: [din, dstate]
    pub wx: Matrix,
    /// shape: [1, dstate]
    pub bx1: Matrix,
    /// shape: [dstate, dstate]
    pub ux: Matrix,
    /// shape: [1, dstate]
    pub bx2: Matrix,
}

pub struct AlignmentWeights {
    /// shape: [dctx, datt]
    pub u: Matrix,
    /// shape: [dstate, datt]
    pub w: Matrix,
    /// shape: [1, datt]
    pub b: Matrix,
    /// shape: [1, datt]
    pub v: Matrix,
    /// shape: [1, 1], added to every alignment score
    pub c: Matrix,
}

pub struct SoftmaxWeights {
    /// shape: [dstate, dout]
    pub w1: Matrix,
    /// shape: [1, dout]
    pub b1: Matrix,
    /// shape: [demb, dout]
    pub w2: Matrix,
    /// shape: [1, dout]
    pub b2: Matrix,
    /// shape: [dctx, dout]
    pub w3: Matrix,
    /// shape: [1, dout]
    pub b3: Matrix,
    /// shape: [dout, nvoc]
    pub w4: Matrix,
    /// shape: [1, nvoc]
    pub b4: Matrix,
}

/// 解码器的全部权重。
///
/// 每组权重在加载后不再修改，由同一模型上的所有解码器通过引用计数共享。
#[derive(Clone)]
pub struct Storage {
    pub meta: Dl4mtMeta,
    pub embeddings: Arc<EmbeddingWeights>,
    pub init: Arc<InitWeights>,
    pub gru1: Arc<GruWeights>,
    pub alignment: Arc<AlignmentWeights>,
    pub gru2: Arc<GruWeights>,
    pub softmax: Arc<SoftmaxWeights>,
}

impl Storage {
    /// A model with every parameter drawn uniformly from `[-0.1, 0.1)`.
    pub fn random(meta: Dl4mtMeta, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let rng = &mut rng;
        let &Dl4mtMeta {
            nvoc,
            demb,
            dstate,
            dctx,
            datt,
            dout,
        } = &meta;

        #[rustfmt::skip]
        let ans = Self {
            embeddings: Arc::new(EmbeddingWeights { e: random(rng, nvoc, demb) }),
            init: Arc::new(InitWeights {
                wi: random(rng, dctx, dstate),
                bi: random(rng, 1   , dstate),
            }),
            gru1: Arc::new(GruWeights::random(rng, demb, dstate)),
            alignment: Arc::new(AlignmentWeights {
                u: random(rng, dctx  , datt),
                w: random(rng, dstate, datt),
                b: random(rng, 1     , datt),
                v: random(rng, 1     , datt),
                c: random(rng, 1     , 1   ),
            }),
            gru2: Arc::new(GruWeights::random(rng, dctx, dstate)),
            softmax: Arc::new(SoftmaxWeights {
                w1: random(rng, dstate, dout),
                b1: random(rng, 1     , dout),
                w2: random(rng, demb  , dout),
                b2: random(rng, 1     , dout),
                w3: random(rng, dctx  , dout),
                b3: random(rng, 1     , dout),
                w4: random(rng, dout  , nvoc),
                b4: random(rng, 1     , nvoc),
            }),
            meta,
        };
        ans.check();
        ans
    }

    /// Asserts every weight matches the shape the meta implies.
    pub fn check(&self) {
        let &Dl4mtMeta {
            nvoc,
            demb,
            dstate,
            dctx,
            datt,
            dout,
        } = &self.meta;
        assert!(nvoc > 1, "vocabulary must hold EOS and UNK");
        assert!(demb > 0 && dstate > 0 && dctx > 0 && datt > 0 && dout > 0);

        #[rustfmt::skip]
        let shapes = [
            ("embeddings.e", &self.embeddings.e, (nvoc  , demb  )),
            ("init.wi"     , &self.init.wi     , (dctx  , dstate)),
            ("init.bi"     , &self.init.bi     , (1     , dstate)),
            ("alignment.u" , &self.alignment.u , (dctx  , datt  )),
            ("alignment.w" , &self.alignment.w , (dstate, datt  )),
            ("alignment.b" , &self.alignment.b , (1     , datt  )),
            ("alignment.v" , &self.alignment.v , (1     , datt  )),
            ("alignment.c" , &self.alignment.c , (1     , 1     )),
            ("softmax.w1"  , &self.softmax.w1  , (dstate, dout  )),
            ("softmax.b1"  , &self.softmax.b1  , (1     , dout  )),
            ("softmax.w2"  , &self.softmax.w2  , (demb  , dout  )),
            ("softmax.b2"  , &self.softmax.b2  , (1     , dout  )),
            ("softmax.w3"  , &self.softmax.w3  , (dctx  , dout  )),
            ("softmax.b3"  , &self.softmax.b3  , (1     , dout  )),
            ("softmax.w4"  , &self.softmax.w4  , (dout  , nvoc  )),
            ("softmax.b4"  , &self.softmax.b4  , (1     , nvoc  )),
        ];
        for (name, m, shape) in shapes {
            assert_eq!(m.shape(), shape, "{name}");
        }
        self.gru1.check("gru1", demb, dstate);
        self.gru2.check("gru2", dctx, dstate);
    }
}

impl GruWeights {
    fn random(rng: &mut StdRng, din: usize, d: usize) -> Self {
        #[rustfmt::skip]
        let ans = Self {
            w  : random(rng, din, 2 * d),
            b  : random(rng, 1  , 2 * d),
            u  : random(rng, d  , 2 * d),
            wx : random(rng, din, d    ),
            bx1: random(rng, 1  , d    ),
            ux : random(rng, d  , d    ),
            bx2: random(rng, 1  , d    ),
        };
        ans
    }

    fn check(&self, name: &str, din: usize, d: usize) {
        #[rustfmt::skip]
        let shapes = [
            ("w"  , &self.w  , (din, 2 * d)),
            ("b"  , &self.b  , (1  , 2 * d)),
            ("u"  , &self.u  , (d  , 2 * d)),
            ("wx" , &self.wx , (din, d    )),
            ("bx1", &self.bx1, (1  , d    )),
            ("ux" , &self.ux , (d  , d    )),
            ("bx2", &self.bx2, (1  , d    )),
        ];
        for (field, m, shape) in shapes {
            assert_eq!(m.shape(), shape, "{name}.{field}");
        }
    }

    /// Width of the input this cell consumes.
    #[inline]
    pub fn din(&self) -> usize {
        self.w.rows()
    }

    /// Width of the state this cell updates.
    #[inline]
    pub fn dstate(&self) -> usize {
        self.u.rows()
    }
}

fn random(rng: &mut StdRng, rows: usize, cols: usize) -> Matrix {
    Matrix::from_fn(rows, cols, |_, _| rng.gen_range(-0.1..0.1))
}

#[test]
fn test_random() {
    let meta = Dl4mtMeta {
        nvoc: 10,
        demb: 4,
        dstate: 3,
        dctx: 6,
        datt: 5,
        dout: 4,
    };
    let a = Storage::random(meta.clone(), 42);
    let b = Storage::random(meta, 42);
    assert_eq!(a.softmax.w4, b.softmax.w4);
    assert_eq!(a.gru2.din(), 6);
    assert_eq!(a.gru2.dstate(), 3);
    assert!(a.embeddings.e.as_slice().iter().all(|x| x.abs() < 0.1));

    // shared, not copied
    let c = a.clone();
    assert!(Arc::ptr_eq(&a.softmax, &c.softmax));
}

#[test]
#[should_panic(expected = "gru1.wx")]
fn test_check_mismatch() {
    let meta = Dl4mtMeta {
        nvoc: 10,
        demb: 4,
        dstate: 3,
        dctx: 6,
        datt: 5,
        dout: 4,
    };
    let mut storage = Storage::random(meta, 0);
    let mut rng = StdRng::seed_from_u64(0);
    let mut gru = GruWeights::random(&mut rng, 4, 3);
    gru.wx = Matrix::new(5, 3);
    storage.gru1 = Arc::new(gru);
    storage.check();
}
