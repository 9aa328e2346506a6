/*!
Serialization of priors.

- [`stream`]: the versioned, line-oriented text format, with type-tag dispatch on read.
- [`record`]: the structured `{ type, transforms, nParams, <param>... }` record used for
  interchange with other tools.
*/

pub mod record;
pub mod stream;

pub use stream::{read_dist_from_stream, read_dist_from_stream_with, write_dist_to_stream};
