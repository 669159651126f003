//! Operations built purely from primitives. None of them records a
//! gradient rule of its own: differentiation flows through the primitives
//! they expand into.

mod activation;
mod linalg;
mod nn;
mod shape;
