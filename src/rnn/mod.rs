//! # Sequence Processing
//!
//! [`HybridRnn`] wraps a [`HybridCell`](crate::cells::HybridCell) and threads its
//! packed state over a whole sequence.
//!
//! ## Tensor Shapes
//!
//! | Tensor | Shape | Description |
//! |--------|-------|-------------|
//! | `input` | `[batch, seq, k_in]` | Batch-first (default) |
//! | `input` | `[seq, batch, k_in]` | With `.with_batch_first(false)` |
//! | `timespans` | `[batch, seq]` | Time delta per sample and step |
//! | `outputs` | `[batch, seq, k_out]` | Decoded outputs |
//! | `state` | `[batch, k_out + k_state + 2]` | Final packed state |
//!
//! ## Forced Modes
//!
//! ```ignore
//! // Impose a known mode sequence instead of evaluating transitions.
//! let forced: Vec<Vec<usize>> = labels_per_step;
//! let rollout = rnn.forward(input, None, Some(timespans), Some(&forced))?;
//! ```
//!
//! ## Stateful Processing
//!
//! ```ignore
//! let first = rnn.forward(chunk1, None, None, None)?;
//! let second = rnn.forward(chunk2, Some(first.state), None, None)?;
//! ```

pub mod hybrid_rnn;

pub use hybrid_rnn::{HybridRnn, Rollout};
