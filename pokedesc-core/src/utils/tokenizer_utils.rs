use anyhow::{Context, Result};
use std::path::Path;
use tokenizers::decoders::wordpiece::WordPiece as WordPieceDecoder;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{AddedToken, Tokenizer};

#[derive(Debug, serde::Deserialize)]
struct TokenObj {
    content: String,
    #[serde(default)]
    lstrip: bool,
    #[serde(default)]
    rstrip: bool,
    #[serde(default)]
    normalized: bool,
    #[serde(default)]
    single_word: bool,
    #[serde(default)]
    special: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum MaybeToken {
    Str(String),
    Obj(TokenObj),
}

#[derive(Debug, serde::Deserialize, Default)]
struct TokenizerConfigLike {
    #[serde(default)]
    added_tokens_decoder: std::collections::HashMap<String, TokenObj>,
    #[serde(default)]
    do_lower_case: Option<bool>,
    #[serde(default)]
    unk_token: Option<MaybeToken>,
    #[serde(default)]
    sep_token: Option<MaybeToken>,
    #[serde(default)]
    cls_token: Option<MaybeToken>,
    #[serde(default)]
    pad_token: Option<MaybeToken>,
    #[serde(default)]
    mask_token: Option<MaybeToken>,
    #[serde(default)]
    bos_token: Option<MaybeToken>,
}

fn as_added_token(tok: &TokenObj) -> AddedToken {
    AddedToken::from(tok.content.clone(), tok.special)
        .lstrip(tok.lstrip)
        .rstrip(tok.rstrip)
        .normalized(tok.normalized)
        .single_word(tok.single_word)
}

fn maybe_token_to_obj(tok: &MaybeToken) -> TokenObj {
    match tok {
        MaybeToken::Str(s) => TokenObj {
            content: s.clone(),
            lstrip: false,
            rstrip: false,
            normalized: false,
            single_word: false,
            special: true,
        },
        MaybeToken::Obj(o) => TokenObj {
            content: o.content.clone(),
            lstrip: o.lstrip,
            rstrip: o.rstrip,
            normalized: o.normalized,
            single_word: o.single_word,
            special: o.special,
        },
    }
}

fn read_tokenizer_config(dir: &Path) -> Result<TokenizerConfigLike> {
    let tok_cfg_path = dir.join("tokenizer_config.json");
    if !tok_cfg_path.exists() {
        return Ok(TokenizerConfigLike::default());
    }
    let cfg_data = std::fs::read_to_string(&tok_cfg_path)
        .with_context(|| format!("Failed to read {}", tok_cfg_path.display()))?;
    Ok(serde_json::from_str::<TokenizerConfigLike>(&cfg_data).unwrap_or_default())
}

/// Builds a BERT-style WordPiece tokenizer from `vocab.txt`, the layout
/// older BLIP checkpoints ship instead of `tokenizer.json`.
fn load_bert_wordpiece_tokenizer(dir: &Path) -> Result<Tokenizer> {
    let vocab = dir.join("vocab.txt");
    if !vocab.exists() {
        anyhow::bail!(
            "No supported tokenizer files in {}. Need tokenizer.json or vocab.txt",
            dir.display()
        );
    }
    let vocab_str = vocab
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 path: {}", vocab.display()))?;

    let cfg = read_tokenizer_config(dir)?;

    let mut builder = WordPiece::from_file(vocab_str);
    if let Some(unk) = &cfg.unk_token {
        builder = builder.unk_token(maybe_token_to_obj(unk).content);
    }
    let model = builder
        .build()
        .map_err(anyhow::Error::msg)
        .context("Failed to build WordPiece tokenizer from vocab.txt")?;

    let lowercase = cfg.do_lower_case.unwrap_or(true);
    let mut tokenizer = Tokenizer::new(model);
    tokenizer.with_normalizer(Some(BertNormalizer::new(true, true, None, lowercase)));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_decoder(Some(WordPieceDecoder::default()));

    let mut tokens: Vec<AddedToken> = cfg
        .added_tokens_decoder
        .values()
        .map(as_added_token)
        .collect();
    for maybe in [
        cfg.unk_token,
        cfg.sep_token,
        cfg.cls_token,
        cfg.pad_token,
        cfg.mask_token,
        cfg.bos_token,
    ]
    .into_iter()
    .flatten()
    {
        tokens.push(as_added_token(&maybe_token_to_obj(&maybe)));
    }
    if !tokens.is_empty() {
        tokenizer.add_special_tokens(&tokens);
    }

    Ok(tokenizer)
}

/// Loads a tokenizer file; `vocab.txt` is rebuilt as a BERT WordPiece
/// tokenizer together with the `tokenizer_config.json` next to it.
pub fn load_tokenizer_file(path: &Path) -> Result<Tokenizer> {
    if path.file_name().is_some_and(|n| n == "vocab.txt") {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("vocab.txt has no parent dir"))?;
        return load_bert_wordpiece_tokenizer(dir);
    }
    Tokenizer::from_file(path)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Failed to load {}", path.display()))
}
