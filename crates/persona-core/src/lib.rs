//! # persona-core
//!
//! Model registry, prompt templates and quantized generation for
//! persona-chat.
//!
//! ## Models
//!
//! | `model_id` | Kind | Template |
//! |---|---|---|
//! | `1` | Nous-Hermes 13B (GGUF) | `### Instruction:` / `### You:` |
//! | `2` | Pygmalion 7B SuperHOT-8K (GGUF) | `{name}'s Persona:` / `<START>` |
//!
//! ## Feature Flags
//!
//! | Flag | Effect |
//! |---|---|
//! | `cuda` | Enable CUDA GPU acceleration |
//! | `metal` | Enable Apple Metal GPU acceleration |

pub mod device;
pub mod dispatcher;
pub mod error;
pub mod kind;
pub mod model;
pub mod prompt;
pub mod quantized;
pub mod registry;
pub mod sampling;
pub mod tokenizer;

pub use device::Placement;
pub use dispatcher::{Dispatcher, Reply};
pub use error::{CoreError, CoreResult};
pub use kind::ModelKind;
pub use model::{FinishReason, GenerateInput, Generation, Model, ModelConfig, SamplingParams};
pub use prompt::{build_prompt, policy_for, Conversation, DecodingParams, TemplatePolicy};
pub use quantized::QuantizedModel;
pub use registry::{ModelRegistry, RegistryEntry};
pub use tokenizer::Tokenizer;
