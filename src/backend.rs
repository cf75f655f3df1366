// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The hardware engine seam.
//!
//! A backend is a provider of MJPEG processing, most likely a hardware engine
//! like Rockchip MPP reached over FFI. This module contains the capability
//! types and operations a session needs from such an engine; the session
//! layer never touches the hardware except through the [`Backend`] trait, so
//! it can be exercised against the [`dummy`] double on hosts without the
//! hardware.

pub mod dummy;

use enumn::N;
use thiserror::Error;

use crate::DecodedFormat;
use crate::Resolution;

/// Error returned by backend operations.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("not enough resources to proceed with the operation now")]
    OutOfResources,
    #[error("the operation timed out")]
    Timeout,
    #[error("no data is ready to be retrieved")]
    NotReady,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type returned by backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Direction tag passed to the engine when binding a codec context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingMode {
    Encode,
    Decode,
}

/// The two buffer pools a session exchanges data with the engine through:
/// one for raw frames, one for compressed packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferGroupKind {
    Frame,
    Packet,
}

/// Numeric frame-format tag as reported by the hardware registers.
#[derive(N, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum HwFrameFormat {
    Yuv420Sp = 0,
    Yuv420P = 1,
    Yuv422Sp = 2,
    Yuv422P = 3,
    Rgb565 = 4,
    Rgb888 = 5,
}

impl HwFrameFormat {
    /// Maps the hardware tag to a format this crate can hand to callers.
    /// Returns `None` for layouts the MJPEG pipelines do not produce.
    pub fn to_decoded(self) -> Option<DecodedFormat> {
        match self {
            HwFrameFormat::Yuv420Sp => Some(DecodedFormat::NV12),
            _ => None,
        }
    }
}

/// Immutable parameters wired to the hardware when a session is configured.
///
/// For decode sessions `resolution` is the maximum the session accepts and
/// the encode-only fields (`framerate`, `bitrate`, `quality`) are zero.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub coding: CodingMode,
    pub resolution: Resolution,
    /// Frames per second.
    pub framerate: u32,
    /// Target bitrate in bits per second. 0 selects automatic rate control.
    pub bitrate: u32,
    /// JPEG quality, 1-100.
    pub quality: u32,
    /// Raw-frame pixel format on the session's uncompressed side.
    pub format: DecodedFormat,
}

/// A decoded frame retrieved from the hardware.
#[derive(Debug, Clone, Copy)]
pub struct RetrievedFrame {
    /// Number of bytes written to the caller's output buffer.
    pub len: usize,
    /// Dimensions of the decoded frame.
    pub resolution: Resolution,
    /// Raw hardware format tag, convertible through [`HwFrameFormat::n`].
    pub format: u32,
    /// Timestamp reported by the engine.
    pub timestamp: u64,
}

/// Interface to the hardware codec engine.
///
/// Handles returned by an implementation are opaque capabilities owned by
/// exactly one session. The session guarantees that `destroy_context` is
/// called only after every buffer group created for the context has been
/// released, and serializes all calls touching one context behind its lock.
pub trait Backend: Clone {
    /// Opaque codec context handle.
    type Context;
    /// Opaque engine interface handle, obtained together with the context.
    type Interface;
    /// Hardware-managed buffer pool handle.
    type BufferGroup;

    /// Binds a fresh codec context for `coding` and returns it together with
    /// the interface handle used to drive it.
    fn create_context(
        &self,
        coding: CodingMode,
    ) -> BackendResult<(Self::Context, Self::Interface)>;

    /// Allocates a hardware buffer group of `kind`.
    fn create_buffer_group(&self, kind: BufferGroupKind) -> BackendResult<Self::BufferGroup>;

    /// Wires the session parameters (resolution, format, rate, quality) to
    /// the hardware. Called exactly once per context, before any submit.
    fn configure(
        &self,
        context: &mut Self::Context,
        interface: &mut Self::Interface,
        params: &SessionParams,
    ) -> BackendResult<()>;

    /// Hands one raw NV12 frame to the encode pipe.
    fn submit_frame(
        &self,
        context: &mut Self::Context,
        interface: &mut Self::Interface,
        frame_group: &mut Self::BufferGroup,
        nv12: &[u8],
    ) -> BackendResult<()>;

    /// Collects the compressed packet produced for the last submitted frame
    /// into `jpeg` and returns its length.
    fn retrieve_packet(
        &self,
        context: &mut Self::Context,
        interface: &mut Self::Interface,
        packet_group: &mut Self::BufferGroup,
        jpeg: &mut [u8],
    ) -> BackendResult<usize>;

    /// Hands one compressed packet to the decode pipe.
    fn submit_packet(
        &self,
        context: &mut Self::Context,
        interface: &mut Self::Interface,
        packet_group: &mut Self::BufferGroup,
        jpeg: &[u8],
    ) -> BackendResult<()>;

    /// Collects the raw frame decoded from the last submitted packet into
    /// `nv12`.
    fn retrieve_frame(
        &self,
        context: &mut Self::Context,
        interface: &mut Self::Interface,
        frame_group: &mut Self::BufferGroup,
        nv12: &mut [u8],
    ) -> BackendResult<RetrievedFrame>;

    /// Releases a buffer group.
    fn release_buffer_group(&self, group: Self::BufferGroup);

    /// Tears down a codec context and its interface handle. Every buffer
    /// group created for the context must have been released beforehand.
    fn destroy_context(&self, context: Self::Context, interface: Self::Interface);
}
