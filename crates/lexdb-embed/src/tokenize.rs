use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Model inputs for a single text, each shaped `[1, T]`.
pub struct Encoded {
    pub input_ids: Tensor,
    pub token_type_ids: Tensor,
    pub attention_mask: Tensor,
}

/// Tokenize one text, truncated to `max_len` tokens. No padding is needed for a batch of one.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<Encoded> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let len = enc.get_ids().len().min(max_len).max(1);
    let take = |v: &[u32]| -> Vec<u32> {
        let mut out: Vec<u32> = v.iter().copied().take(len).collect();
        out.resize(len, 0);
        out
    };
    let ids = take(enc.get_ids());
    let type_ids = take(enc.get_type_ids());
    let mut mask = take(enc.get_attention_mask());
    if mask.iter().all(|m| *m == 0) {
        mask[0] = 1;
    }
    Ok(Encoded {
        input_ids: Tensor::new(ids.as_slice(), device)?.unsqueeze(0)?,
        token_type_ids: Tensor::new(type_ids.as_slice(), device)?.unsqueeze(0)?,
        attention_mask: Tensor::new(mask.as_slice(), device)?.unsqueeze(0)?,
    })
}
