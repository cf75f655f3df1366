// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Round-trips generated NV12 frames through an encode and a decode session
//! running on the software double of the hardware engine.

use std::str::FromStr;

use anyhow::Context;
use argh::FromArgs;
use mpp_mjpeg::backend::dummy;
use mpp_mjpeg::decoder::Decoder;
use mpp_mjpeg::decoder::DecoderConfig;
use mpp_mjpeg::encoder::Encoder;
use mpp_mjpeg::encoder::EncoderConfig;
use mpp_mjpeg::nv12_frame_size;
use mpp_mjpeg::DecodedFormat;

fn parse_format(value: &str) -> Result<DecodedFormat, String> {
    DecodedFormat::from_str(value).map_err(|err| err.to_string())
}

#[derive(Debug, FromArgs)]
/// Encode generated NV12 frames to MJPEG and decode them back.
struct Args {
    /// frame width in pixels
    #[argh(option, default = "640")]
    width: u32,

    /// frame height in pixels
    #[argh(option, default = "480")]
    height: u32,

    /// number of frames to process
    #[argh(option, default = "10")]
    count: u32,

    /// JPEG quality (0 uses the library default)
    #[argh(option, default = "0")]
    quality: u32,

    /// output format to decode into
    #[argh(option, default = "DecodedFormat::NV12", from_str_fn(parse_format))]
    format: DecodedFormat,
}

/// Fills `frame` with a deterministic pattern that changes per `tick`.
fn fill_test_frame(frame: &mut [u8], tick: u32) {
    for (i, byte) in frame.iter_mut().enumerate() {
        *byte = (i as u32).wrapping_add(tick.wrapping_mul(7)) as u8;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Args = argh::from_env();

    println!("mpp-mjpeg {}", mpp_mjpeg::version());

    let encoder = Encoder::new_dummy(&EncoderConfig {
        width: args.width,
        height: args.height,
        framerate: 30,
        bitrate: 0,
        quality: args.quality,
        gop: 0,
    })
    .context("failed to create encoder")?;

    let decoder = Decoder::new(
        dummy::Backend::new(),
        &DecoderConfig {
            max_width: args.width,
            max_height: args.height,
            output_format: args.format,
        },
    )
    .context("failed to create decoder")?;

    let frame_size = nv12_frame_size(args.width, args.height);
    let mut nv12 = vec![0u8; frame_size];
    let mut jpeg = vec![0u8; frame_size];
    let mut decoded = vec![0u8; frame_size];

    for tick in 0..args.count {
        fill_test_frame(&mut nv12, tick);

        let len = encoder
            .encode(&nv12, &mut jpeg)
            .with_context(|| format!("failed to encode frame {}", tick))?;

        let (decoded_len, info) = decoder
            .decode(&jpeg[..len], &mut decoded)
            .with_context(|| format!("failed to decode frame {}", tick))?;

        println!(
            "frame {}: {} raw bytes -> {} coded bytes -> {} decoded bytes ({}x{}, ts={})",
            tick,
            nv12.len(),
            len,
            decoded_len,
            info.resolution.width,
            info.resolution.height,
            info.timestamp,
        );
    }

    let enc_stats = encoder.stats();
    let dec_stats = decoder.stats();
    println!(
        "encoder: {} frames, {} bytes; decoder: {} frames, {} bytes",
        enc_stats.frames_processed,
        enc_stats.bytes_processed,
        dec_stats.frames_processed,
        dec_stats.bytes_processed,
    );

    Ok(())
}
