// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! NV12 to MJPEG encoding sessions.

use crate::backend::dummy;
use crate::backend::Backend;
use crate::backend::CodingMode;
use crate::backend::SessionParams;
use crate::session::Session;
use crate::DecodedFormat;
use crate::Error;
use crate::Resolution;
use crate::Result;
use crate::SessionStats;

/// Lowest frame rate the encoder accepts, in frames per second.
pub const MIN_FRAMERATE: u32 = 1;

/// Highest frame rate the encoder accepts, in frames per second.
pub const MAX_FRAMERATE: u32 = 120;

/// Quality used when [`EncoderConfig::quality`] is left at 0.
pub const DEFAULT_QUALITY: u32 = 80;

/// Encoder session configuration. Immutable once the encoder is created.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub framerate: u32,
    /// Target bitrate in bits per second. 0 selects automatic rate control.
    pub bitrate: u32,
    /// JPEG quality, 1-100. 0 selects [`DEFAULT_QUALITY`].
    pub quality: u32,
    /// GOP size. Accepted for forward compatibility; MJPEG has no inter
    /// frames, so the value is not used.
    pub gop: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 30,
            bitrate: 0,
            quality: 0,
            gop: 0,
        }
    }
}

impl EncoderConfig {
    /// Checks the configuration against the hardware limits. Pure; no
    /// hardware resource is touched.
    fn validate(&self) -> Result<()> {
        let resolution = Resolution::from((self.width, self.height));
        if !resolution.fits_hardware() {
            log::error!("invalid resolution: {}x{}", self.width, self.height);
            return Err(Error::InvalidParam);
        }

        if !(MIN_FRAMERATE..=MAX_FRAMERATE).contains(&self.framerate) {
            log::error!("invalid framerate: {}", self.framerate);
            return Err(Error::InvalidParam);
        }

        if self.quality > 100 {
            log::error!("invalid quality: {} (valid range is 0-100)", self.quality);
            return Err(Error::InvalidParam);
        }

        Ok(())
    }

    fn session_params(&self) -> SessionParams {
        SessionParams {
            coding: CodingMode::Encode,
            resolution: Resolution::from((self.width, self.height)),
            framerate: self.framerate,
            bitrate: self.bitrate,
            // 0 means unset.
            quality: if self.quality == 0 {
                DEFAULT_QUALITY
            } else {
                self.quality
            },
            format: DecodedFormat::NV12,
        }
    }
}

/// An MJPEG encoder session.
///
/// The encoder can be shared between threads; calls on one instance are
/// serialized by the session lock. Dropping the encoder releases its
/// hardware resources.
pub struct Encoder<B: Backend> {
    session: Session<B>,
}

impl<B: Backend> Encoder<B> {
    /// Creates and initializes an encoder session on `backend`.
    pub fn new(backend: B, config: &EncoderConfig) -> Result<Self> {
        config.validate()?;

        let params = config.session_params();
        let session = Session::create(backend, params)?;

        log::debug!(
            "MJPEG encoder created: {}x{}@{}fps, quality={}",
            config.width,
            config.height,
            config.framerate,
            if config.quality == 0 {
                DEFAULT_QUALITY
            } else {
                config.quality
            }
        );

        Ok(Self { session })
    }

    /// Encodes one NV12 frame into `jpeg` and returns the encoded length.
    ///
    /// `nv12` must hold at least [`nv12_frame_size`] bytes for the
    /// configured resolution and `jpeg` must have at least that much
    /// capacity, otherwise the call fails with [`Error::InvalidParam`]
    /// without touching the hardware or the statistics.
    ///
    /// [`nv12_frame_size`]: crate::nv12_frame_size
    pub fn encode(&self, nv12: &[u8], jpeg: &mut [u8]) -> Result<usize> {
        self.session.encode_frame(nv12, jpeg)
    }

    /// Returns the running totals of frames and bytes encoded so far.
    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }
}

impl Encoder<dummy::Backend> {
    /// Creates an encoder backed by the software double of the engine.
    pub fn new_dummy(config: &EncoderConfig) -> Result<Self> {
        Self::new(dummy::Backend::new(), config)
    }
}
