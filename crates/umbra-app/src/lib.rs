//! Headless Umbra application: builds a demo scene, drives the renderer for
//! a fixed number of frames and writes the final image to disk.

pub mod frame_loop;
pub mod scene;
