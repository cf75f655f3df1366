// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! MJPEG to NV12 decoding sessions.

use crate::backend::dummy;
use crate::backend::Backend;
use crate::backend::CodingMode;
use crate::backend::HwFrameFormat;
use crate::backend::SessionParams;
use crate::session::Session;
use crate::DecodedFormat;
use crate::Error;
use crate::Resolution;
use crate::Result;
use crate::SessionStats;

/// Decoder session configuration. Immutable once the decoder is created.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Largest frame width the session will decode.
    pub max_width: u32,
    /// Largest frame height the session will decode.
    pub max_height: u32,
    /// Raw-frame format the session emits. NV12 is the only format the
    /// hardware produces today.
    pub output_format: DecodedFormat,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            output_format: DecodedFormat::NV12,
        }
    }
}

impl DecoderConfig {
    /// Checks the configuration against the hardware limits. Pure; no
    /// hardware resource is touched.
    fn validate(&self) -> Result<()> {
        let resolution = Resolution::from((self.max_width, self.max_height));
        if !resolution.fits_hardware() {
            log::error!(
                "invalid max resolution: {}x{}",
                self.max_width,
                self.max_height
            );
            return Err(Error::InvalidParam);
        }

        Ok(())
    }

    fn session_params(&self) -> SessionParams {
        SessionParams {
            coding: CodingMode::Decode,
            resolution: Resolution::from((self.max_width, self.max_height)),
            framerate: 0,
            bitrate: 0,
            quality: 0,
            format: self.output_format,
        }
    }
}

/// Description of one decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Dimensions of the decoded frame.
    pub resolution: Resolution,
    /// Pixel format of the frame written to the output buffer.
    pub format: DecodedFormat,
    /// Timestamp reported by the hardware.
    pub timestamp: u64,
}

/// An MJPEG decoder session.
///
/// The decoder can be shared between threads; calls on one instance are
/// serialized by the session lock. Dropping the decoder releases its
/// hardware resources.
pub struct Decoder<B: Backend> {
    session: Session<B>,
}

impl<B: Backend> Decoder<B> {
    /// Creates and initializes a decoder session on `backend`.
    pub fn new(backend: B, config: &DecoderConfig) -> Result<Self> {
        config.validate()?;

        let params = config.session_params();
        let session = Session::create(backend, params)?;

        log::debug!(
            "MJPEG decoder created: max resolution {}x{}",
            config.max_width,
            config.max_height
        );

        Ok(Self { session })
    }

    /// Decodes one compressed packet into `nv12`. Returns the number of
    /// bytes written and what the hardware reported about the frame.
    ///
    /// An empty `jpeg` fails with [`Error::InvalidParam`] without touching
    /// the hardware or the statistics.
    pub fn decode(&self, jpeg: &[u8], nv12: &mut [u8]) -> Result<(usize, FrameInfo)> {
        let frame = self.session.decode_packet(jpeg, nv12)?;

        let format = HwFrameFormat::n(frame.format)
            .and_then(HwFrameFormat::to_decoded)
            .ok_or_else(|| {
                log::error!("hardware reported unknown frame format {}", frame.format);
                Error::Decode
            })?;

        Ok((
            frame.len,
            FrameInfo {
                resolution: frame.resolution,
                format,
                timestamp: frame.timestamp,
            },
        ))
    }

    /// Returns the running totals of packets and bytes decoded so far.
    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }
}

impl Decoder<dummy::Backend> {
    /// Creates a decoder backed by the software double of the engine.
    pub fn new_dummy(config: &DecoderConfig) -> Result<Self> {
        Self::new(dummy::Backend::new(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::encoder::EncoderConfig;
    use crate::nv12_frame_size;

    fn test_config() -> DecoderConfig {
        DecoderConfig {
            max_width: 640,
            max_height: 480,
            output_format: DecodedFormat::NV12,
        }
    }

    #[test]
    fn create_and_destroy() {
        let decoder = Decoder::new_dummy(&test_config()).unwrap();
        drop(decoder);
    }

    #[test]
    fn rejects_out_of_range_configs() {
        let mut config = test_config();
        config.max_width = 8;
        assert_eq!(Decoder::new_dummy(&config).map(|_| ()), Err(Error::InvalidParam));

        let mut config = test_config();
        config.max_height = 4097;
        assert_eq!(Decoder::new_dummy(&config).map(|_| ()), Err(Error::InvalidParam));
    }

    #[test]
    fn empty_packet_is_rejected_and_counters_untouched() {
        let decoder = Decoder::new_dummy(&test_config()).unwrap();
        let mut nv12 = vec![0u8; nv12_frame_size(640, 480)];

        assert_eq!(decoder.decode(&[], &mut nv12), Err(Error::InvalidParam));
        assert_eq!(decoder.stats(), SessionStats::default());
    }

    #[test]
    fn decode_reports_configured_resolution() {
        let decoder = Decoder::new_dummy(&test_config()).unwrap();
        let jpeg = vec![0xabu8; 1024];
        let mut nv12 = vec![0u8; nv12_frame_size(640, 480)];

        let (len, info) = decoder.decode(&jpeg, &mut nv12).unwrap();
        assert!(len > 0);
        assert_eq!(info.resolution, Resolution::from((640, 480)));
        assert_eq!(info.format, DecodedFormat::NV12);

        let stats = decoder.stats();
        assert_eq!(stats.frames_processed, 1);
        assert_eq!(stats.bytes_processed, len as u64);
    }

    #[test]
    fn decode_timestamps_are_monotonic() {
        let decoder = Decoder::new_dummy(&test_config()).unwrap();
        let jpeg = vec![0x17u8; 512];
        let mut nv12 = vec![0u8; nv12_frame_size(640, 480)];

        let (_, first) = decoder.decode(&jpeg, &mut nv12).unwrap();
        let (_, second) = decoder.decode(&jpeg, &mut nv12).unwrap();
        assert!(second.timestamp > first.timestamp);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let _ = env_logger::builder().is_test(true).try_init();

        let encoder = Encoder::new_dummy(&EncoderConfig {
            width: 640,
            height: 480,
            framerate: 30,
            bitrate: 0,
            quality: 80,
            gop: 0,
        })
        .unwrap();
        let decoder = Decoder::new_dummy(&test_config()).unwrap();

        let size = nv12_frame_size(640, 480);
        assert_eq!(size, 460800);

        // A flat gray frame with a ramp in the luma plane.
        let mut input = vec![0x80u8; size];
        for (i, byte) in input.iter_mut().enumerate().take(640 * 480) {
            *byte = (i % 251) as u8;
        }

        let mut jpeg = vec![0u8; size];
        let len = encoder.encode(&input, &mut jpeg).unwrap();
        assert!(len > 0);
        assert_eq!(encoder.stats().frames_processed, 1);

        let mut output = vec![0u8; size];
        let (decoded_len, info) = decoder.decode(&jpeg[..len], &mut output).unwrap();

        assert_eq!(info.resolution, Resolution::from((640, 480)));
        assert_eq!(decoded_len, size);
        assert_eq!(
            crc32fast::hash(&input),
            crc32fast::hash(&output),
            "decoded frame does not match the encoded input"
        );
        assert_eq!(decoder.stats().frames_processed, 1);
    }
}
