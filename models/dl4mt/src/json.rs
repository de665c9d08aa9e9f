use crate::Dl4mtMeta;

/// The model options as written next to a trained model.
///
/// Context, attention and output widths are optional and follow the usual
/// bidirectional-encoder layout when absent.
#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub(crate) struct MetaJson {
    pub vocab_size: usize,
    pub dim_word: usize,
    pub dim: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim_ctx: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim_att: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim_out: Option<usize>,
}

impl From<MetaJson> for Dl4mtMeta {
    fn from(json: MetaJson) -> Self {
        let dctx = json.dim_ctx.unwrap_or(2 * json.dim);
        Self {
            nvoc: json.vocab_size,
            demb: json.dim_word,
            dstate: json.dim,
            dctx,
            datt: json.dim_att.unwrap_or(dctx),
            dout: json.dim_out.unwrap_or(json.dim_word),
        }
    }
}

impl From<&Dl4mtMeta> for MetaJson {
    fn from(meta: &Dl4mtMeta) -> Self {
        Self {
            vocab_size: meta.nvoc,
            dim_word: meta.demb,
            dim: meta.dstate,
            dim_ctx: Some(meta.dctx),
            dim_att: Some(meta.datt),
            dim_out: Some(meta.dout),
        }
    }
}
