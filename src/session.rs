// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Direction-agnostic hardware codec session.
//!
//! A session exclusively owns one codec context, one interface handle and two
//! buffer groups, acquired in that order and released in reverse order by the
//! bundle's `Drop`. Every operation that touches the hardware or the running
//! counters holds the session lock for its entire duration: one session
//! processes at most one unit at a time, serializing callers on a hardware
//! pipe that is single-consumer per context.

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BufferGroupKind;
use crate::backend::CodingMode;
use crate::backend::RetrievedFrame;
use crate::backend::SessionParams;
use crate::nv12_frame_size;
use crate::Error;
use crate::Result;

/// Running totals of a session's successfully processed units. Counters are
/// monotonic and never reset for the lifetime of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Units (frames or packets) processed successfully.
    pub frames_processed: u64,
    /// Bytes produced across all successful calls.
    pub bytes_processed: u64,
}

/// The hardware handles owned by one session, released in reverse
/// acquisition order on drop: packet group, frame group, then the
/// context/interface pair.
///
/// The fields are only `None` while creation is in flight or after a
/// creation step failed; a bundle reachable from a live [`Session`] always
/// has every handle set.
struct HandleBundle<B: Backend> {
    backend: B,
    context: Option<B::Context>,
    interface: Option<B::Interface>,
    frame_group: Option<B::BufferGroup>,
    packet_group: Option<B::BufferGroup>,
}

/// Mutable borrows of every live handle of a bundle, for one hardware call
/// sequence under the session lock.
struct Active<'a, B: Backend> {
    backend: &'a B,
    context: &'a mut B::Context,
    interface: &'a mut B::Interface,
    frame_group: &'a mut B::BufferGroup,
    packet_group: &'a mut B::BufferGroup,
}

impl<B: Backend> HandleBundle<B> {
    /// Acquires the full handle bundle and configures the context. A failure
    /// at any step drops the partial bundle, which releases everything
    /// acquired so far in reverse order.
    fn acquire(backend: B, params: &SessionParams) -> Result<Self> {
        let (context, interface) = backend
            .create_context(params.coding)
            .map_err(|err| creation_error("codec context", err))?;

        let mut bundle = HandleBundle {
            backend,
            context: Some(context),
            interface: Some(interface),
            frame_group: None,
            packet_group: None,
        };

        bundle.frame_group = Some(
            bundle
                .backend
                .create_buffer_group(BufferGroupKind::Frame)
                .map_err(|err| creation_error("frame buffer group", err))?,
        );

        bundle.packet_group = Some(
            bundle
                .backend
                .create_buffer_group(BufferGroupKind::Packet)
                .map_err(|err| creation_error("packet buffer group", err))?,
        );

        let hw = bundle.active()?;
        hw.backend
            .configure(hw.context, hw.interface, params)
            .map_err(|err| creation_error("session configuration", err))?;

        Ok(bundle)
    }

    fn active(&mut self) -> Result<Active<'_, B>> {
        let HandleBundle {
            backend,
            context,
            interface,
            frame_group,
            packet_group,
        } = self;

        match (
            context.as_mut(),
            interface.as_mut(),
            frame_group.as_mut(),
            packet_group.as_mut(),
        ) {
            (Some(context), Some(interface), Some(frame_group), Some(packet_group)) => {
                Ok(Active {
                    backend,
                    context,
                    interface,
                    frame_group,
                    packet_group,
                })
            }
            _ => Err(Error::Init),
        }
    }
}

impl<B: Backend> Drop for HandleBundle<B> {
    fn drop(&mut self) {
        if let Some(group) = self.packet_group.take() {
            self.backend.release_buffer_group(group);
        }

        if let Some(group) = self.frame_group.take() {
            self.backend.release_buffer_group(group);
        }

        if let (Some(context), Some(interface)) = (self.context.take(), self.interface.take()) {
            self.backend.destroy_context(context, interface);
        }
    }
}

struct Inner<B: Backend> {
    bundle: HandleBundle<B>,
    stats: SessionStats,
}

/// One encoder or decoder instance bound to one hardware context.
///
/// Dropping the session is its destruction: the buffer groups and the
/// context are released in reverse acquisition order. Ownership makes reuse
/// after destruction and double destruction unrepresentable.
pub(crate) struct Session<B: Backend> {
    params: SessionParams,
    inner: Mutex<Inner<B>>,
}

impl<B: Backend> Session<B> {
    /// Binds a hardware context, allocates both buffer groups and configures
    /// the session. On error nothing acquired remains live.
    pub(crate) fn create(backend: B, params: SessionParams) -> Result<Self> {
        let bundle = HandleBundle::acquire(backend, &params)?;

        log::debug!(
            "session ready: {:?} {}x{}",
            params.coding,
            params.resolution.width,
            params.resolution.height
        );

        Ok(Session {
            params,
            inner: Mutex::new(Inner {
                bundle,
                stats: Default::default(),
            }),
        })
    }

    /// Encodes one raw NV12 frame into `jpeg`, returning the packet length.
    pub(crate) fn encode_frame(&self, nv12: &[u8], jpeg: &mut [u8]) -> Result<usize> {
        if nv12.is_empty() {
            log::error!("empty input frame");
            return Err(Error::InvalidParam);
        }

        let required = nv12_frame_size(self.params.resolution.width, self.params.resolution.height);
        if nv12.len() < required {
            log::error!("NV12 buffer too small: {} < {}", nv12.len(), required);
            return Err(Error::InvalidParam);
        }

        if jpeg.len() < required {
            log::error!(
                "packet output buffer too small: {} < {}",
                jpeg.len(),
                required
            );
            return Err(Error::InvalidParam);
        }

        let mut inner = self.lock();
        let Inner { bundle, stats } = &mut *inner;
        let hw = bundle.active()?;

        hw.backend
            .submit_frame(hw.context, hw.interface, hw.frame_group, nv12)
            .map_err(|err| process_error(CodingMode::Encode, err))?;
        let len = hw
            .backend
            .retrieve_packet(hw.context, hw.interface, hw.packet_group, jpeg)
            .map_err(|err| process_error(CodingMode::Encode, err))?;

        log::trace!("encoded frame: {} -> {} bytes", nv12.len(), len);

        stats.frames_processed += 1;
        stats.bytes_processed += len as u64;

        Ok(len)
    }

    /// Decodes one compressed packet into `nv12`, returning what the
    /// hardware reported about the produced frame.
    pub(crate) fn decode_packet(&self, jpeg: &[u8], nv12: &mut [u8]) -> Result<RetrievedFrame> {
        if jpeg.is_empty() {
            log::error!("empty input packet");
            return Err(Error::InvalidParam);
        }

        let mut inner = self.lock();
        let Inner { bundle, stats } = &mut *inner;
        let hw = bundle.active()?;

        hw.backend
            .submit_packet(hw.context, hw.interface, hw.packet_group, jpeg)
            .map_err(|err| process_error(CodingMode::Decode, err))?;
        let frame = hw
            .backend
            .retrieve_frame(hw.context, hw.interface, hw.frame_group, nv12)
            .map_err(|err| process_error(CodingMode::Decode, err))?;

        log::trace!("decoded packet: {} -> {} bytes", jpeg.len(), frame.len);

        stats.frames_processed += 1;
        stats.bytes_processed += frame.len as u64;

        Ok(frame)
    }

    /// Copies out the running counters.
    pub(crate) fn stats(&self) -> SessionStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, Inner<B>> {
        // Recover the guard if a previous holder panicked; the bundle must
        // still be released when the session is dropped.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn creation_error(what: &str, err: BackendError) -> Error {
    log::error!("failed to acquire {}: {}", what, err);
    match err {
        BackendError::OutOfResources => Error::Memory,
        _ => Error::Init,
    }
}

fn process_error(coding: CodingMode, err: BackendError) -> Error {
    match err {
        BackendError::Timeout => Error::Timeout,
        BackendError::NotReady => Error::NotReady,
        BackendError::OutOfResources => Error::Memory,
        BackendError::Other(err) => {
            log::error!("hardware processing failed: {}", err);
            match coding {
                CodingMode::Encode => Error::Encode,
                CodingMode::Decode => Error::Decode,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy;
    use crate::backend::dummy::Event;
    use crate::backend::dummy::FailKind;
    use crate::backend::dummy::FailPoint;
    use crate::DecodedFormat;
    use crate::Resolution;

    fn test_params(coding: CodingMode) -> SessionParams {
        SessionParams {
            coding,
            resolution: Resolution::from((640, 480)),
            framerate: 30,
            bitrate: 0,
            quality: 80,
            format: DecodedFormat::NV12,
        }
    }

    #[test]
    fn acquisition_and_release_ordering() {
        let backend = dummy::Backend::new();
        let session =
            Session::create(backend.clone(), test_params(CodingMode::Encode)).unwrap();

        assert_eq!(
            backend.journal(),
            vec![
                Event::ContextCreated(CodingMode::Encode),
                Event::BufferGroupCreated(BufferGroupKind::Frame),
                Event::BufferGroupCreated(BufferGroupKind::Packet),
                Event::Configured,
            ]
        );
        assert_eq!(backend.live_handles(), (1, 2));

        drop(session);

        assert_eq!(
            backend.journal(),
            vec![
                Event::ContextCreated(CodingMode::Encode),
                Event::BufferGroupCreated(BufferGroupKind::Frame),
                Event::BufferGroupCreated(BufferGroupKind::Packet),
                Event::Configured,
                Event::BufferGroupReleased(BufferGroupKind::Packet),
                Event::BufferGroupReleased(BufferGroupKind::Frame),
                Event::ContextDestroyed,
            ]
        );
        assert_eq!(backend.live_handles(), (0, 0));
    }

    #[test]
    fn context_failure_acquires_nothing() {
        let backend = dummy::Backend::new();
        backend.fail_at(FailPoint::CreateContext, FailKind::Fault);

        let err = Session::create(backend.clone(), test_params(CodingMode::Encode))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err, Error::Init);
        assert_eq!(backend.journal(), vec![]);
        assert_eq!(backend.live_handles(), (0, 0));
    }

    #[test]
    fn frame_group_failure_unwinds_context() {
        let backend = dummy::Backend::new();
        backend.fail_at(FailPoint::CreateFrameGroup, FailKind::OutOfResources);

        let err = Session::create(backend.clone(), test_params(CodingMode::Encode))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err, Error::Memory);
        assert_eq!(
            backend.journal(),
            vec![
                Event::ContextCreated(CodingMode::Encode),
                Event::ContextDestroyed,
            ]
        );
        assert_eq!(backend.live_handles(), (0, 0));
    }

    #[test]
    fn packet_group_failure_unwinds_frame_group_then_context() {
        let backend = dummy::Backend::new();
        backend.fail_at(FailPoint::CreatePacketGroup, FailKind::OutOfResources);

        let err = Session::create(backend.clone(), test_params(CodingMode::Decode))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err, Error::Memory);
        assert_eq!(
            backend.journal(),
            vec![
                Event::ContextCreated(CodingMode::Decode),
                Event::BufferGroupCreated(BufferGroupKind::Frame),
                Event::BufferGroupReleased(BufferGroupKind::Frame),
                Event::ContextDestroyed,
            ]
        );
        assert_eq!(backend.live_handles(), (0, 0));
    }

    #[test]
    fn configure_failure_unwinds_both_groups_and_context() {
        let backend = dummy::Backend::new();
        backend.fail_at(FailPoint::Configure, FailKind::Fault);

        let err = Session::create(backend.clone(), test_params(CodingMode::Encode))
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err, Error::Init);
        assert_eq!(
            backend.journal(),
            vec![
                Event::ContextCreated(CodingMode::Encode),
                Event::BufferGroupCreated(BufferGroupKind::Frame),
                Event::BufferGroupCreated(BufferGroupKind::Packet),
                Event::BufferGroupReleased(BufferGroupKind::Packet),
                Event::BufferGroupReleased(BufferGroupKind::Frame),
                Event::ContextDestroyed,
            ]
        );
        assert_eq!(backend.live_handles(), (0, 0));
    }

    #[test]
    fn processing_failures_map_to_statuses_and_leave_counters_unchanged() {
        let backend = dummy::Backend::new();
        let session =
            Session::create(backend.clone(), test_params(CodingMode::Encode)).unwrap();

        let nv12 = vec![0u8; nv12_frame_size(640, 480)];
        let mut jpeg = vec![0u8; nv12.len()];

        backend.fail_at(FailPoint::Submit, FailKind::Fault);
        assert_eq!(
            session.encode_frame(&nv12, &mut jpeg).unwrap_err(),
            Error::Encode
        );

        backend.fail_at(FailPoint::Retrieve, FailKind::Timeout);
        assert_eq!(
            session.encode_frame(&nv12, &mut jpeg).unwrap_err(),
            Error::Timeout
        );

        backend.fail_at(FailPoint::Retrieve, FailKind::NotReady);
        assert_eq!(
            session.encode_frame(&nv12, &mut jpeg).unwrap_err(),
            Error::NotReady
        );

        assert_eq!(session.stats(), SessionStats::default());

        backend.clear_failure();
        session.encode_frame(&nv12, &mut jpeg).unwrap();
        assert_eq!(
            session.stats(),
            SessionStats {
                frames_processed: 1,
                bytes_processed: nv12.len() as u64,
            }
        );
    }
}
