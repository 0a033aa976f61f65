//! 测量流程的各个阶段，每个阶段一个 trait，由 Engine 实现

pub mod engine;
pub mod detector;
pub mod contour;
pub mod dimension;
pub mod scale;
pub mod classify;
pub mod annotate;
