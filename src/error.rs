use thiserror::Error;

use crate::vertex::Fvf;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create the graphics factory: {0}")]
    CreateFactory(String),
    #[error("no adapter can present to this window")]
    NoAdapter,
    #[error("failed to create the device: {0}")]
    CreateDevice(String),
    #[error("failed to create a vertex buffer: {0}")]
    CreateVertexBuffer(String),
    #[error("failed to lock the vertex buffer: {0}")]
    Lock(String),
    #[error("the device has not been created")]
    NoDevice,
    #[error("invalid call: {0}")]
    InvalidCall(&'static str),
    #[error("unsupported vertex format {0:?}")]
    UnsupportedFormat(Fvf),
    #[error("failed to acquire a back buffer: {0}")]
    Acquire(String),
    #[error("failed to present: {0}")]
    Present(String),
    #[error("failed to wait for the device: {0}")]
    WaitIdle(String),
}
