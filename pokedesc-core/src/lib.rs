//! # pokedesc-core
//!
//! Model-level library for the Pokemon description generator: resolves BLIP
//! checkpoints from the Hugging Face hub (or a local directory), turns RGB
//! images into model-ready tensors and runs greedy caption generation on top
//! of [Candle](https://github.com/huggingface/candle).
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |---|---|
//! | [`hub`] | Model identifier validation and checkpoint file resolution |
//! | [`models`] | Captioning model implementations (BLIP) and the [`models::ImageCaptioner`] seam |
//! | [`generation`] | Greedy token generation loop and its configuration |
//! | [`utils`] | Device selection, image preprocessing, tokenizer loading |
//!
//! ## Feature flags
//!
//! | Flag | Effect |
//! |---|---|
//! | `cuda` | Enable the CUDA device |
//! | `metal` | Enable the Metal device |
//! | `accelerate` | Link against Apple Accelerate for CPU BLAS |
//! | `mkl` | Link against Intel MKL for CPU BLAS |

pub mod generation;
pub mod hub;
pub mod models;
pub mod utils;

pub use candle_core;
