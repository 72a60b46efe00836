use crate::generation::GenerationConfig;
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;

/// A decoder that produces next-token logits conditioned on state it keeps
/// internally (KV cache, encoder output).
pub trait ModelForCaptioning {
    fn device(&self) -> &Device;

    /// Feeds `new_tokens` (the whole prefix on the first step, one token
    /// afterwards) and returns 1-D logits for the last position.
    fn next_logits(&mut self, new_tokens: &[u32]) -> Result<Tensor>;

    /// Drops any cached decoder state so a new sequence can start.
    fn reset(&mut self) {}

    /// Autoregressive generation from the configured start token. The stop
    /// token is never part of the output.
    fn generate(&mut self, config: &GenerationConfig) -> Result<Vec<u32>> {
        self.reset();

        let mut logits_processor =
            LogitsProcessor::new(config.seed, config.temperature, config.top_p);
        let mut tokens = vec![config.bos_token_id];
        let mut output = Vec::with_capacity(config.max_new_tokens);

        for index in 0..config.max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let logits = self.next_logits(&tokens[start_pos..])?;
            let next_token = logits_processor.sample(&logits)?;
            if next_token == config.eos_token_id {
                break;
            }
            tokens.push(next_token);
            output.push(next_token);
        }

        Ok(output)
    }
}
