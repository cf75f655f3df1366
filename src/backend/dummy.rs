// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains a dummy backend whose only purpose is to let the
//! session layer run so we can test it in isolation, and serve as a
//! placeholder on hosts without the codec hardware.
//!
//! Data is passed through untransformed: the "compressed" packet for a frame
//! is the frame's bytes truncated to the output capacity, and vice versa on
//! the decode side. Every handle the engine gives out is journaled, so tests
//! can assert that sessions release everything they acquire and do so in
//! reverse acquisition order. Failures can be injected at any step of the
//! engine to exercise the session layer's unwind paths.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use anyhow::anyhow;

use crate::backend::BackendError;
use crate::backend::BackendResult;
use crate::backend::BufferGroupKind;
use crate::backend::CodingMode;
use crate::backend::HwFrameFormat;
use crate::backend::RetrievedFrame;
use crate::backend::SessionParams;

/// One hardware call recorded by the engine, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ContextCreated(CodingMode),
    BufferGroupCreated(BufferGroupKind),
    Configured,
    BufferGroupReleased(BufferGroupKind),
    ContextDestroyed,
}

/// Engine step an injected failure fires at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    CreateContext,
    CreateFrameGroup,
    CreatePacketGroup,
    Configure,
    Submit,
    Retrieve,
}

/// Kind of error an injected failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    OutOfResources,
    Timeout,
    NotReady,
    Fault,
}

impl FailKind {
    fn to_error(self) -> BackendError {
        match self {
            FailKind::OutOfResources => BackendError::OutOfResources,
            FailKind::Timeout => BackendError::Timeout,
            FailKind::NotReady => BackendError::NotReady,
            FailKind::Fault => BackendError::Other(anyhow!("injected hardware fault")),
        }
    }
}

#[derive(Default)]
struct State {
    journal: Vec<Event>,
    live_contexts: usize,
    live_groups: usize,
    fail: Option<(FailPoint, FailKind)>,
    configured: Option<SessionParams>,
    next_timestamp: u64,
}

/// Codec context of the dummy engine. Holds the bytes submitted to the pipe
/// until they are retrieved.
pub struct Context {
    coding: CodingMode,
    params: Option<SessionParams>,
    pending: Option<Vec<u8>>,
}

/// Stands in for the engine's interface (function table) handle.
pub struct Interface;

/// Stands in for a hardware-managed buffer pool.
pub struct BufferGroup {
    kind: BufferGroupKind,
}

/// Dummy engine. Clones share one engine; every session bound to a clone is
/// journaled into the same state.
#[derive(Clone, Default)]
pub struct Backend {
    state: Arc<Mutex<State>>,
}

impl Backend {
    pub fn new() -> Self {
        Default::default()
    }

    /// Makes every call hitting `point` fail with `kind` until
    /// [`clear_failure`](Self::clear_failure) is called.
    pub fn fail_at(&self, point: FailPoint, kind: FailKind) {
        self.state().fail = Some((point, kind));
    }

    pub fn clear_failure(&self) {
        self.state().fail = None;
    }

    /// Returns every hardware call recorded so far, in call order.
    pub fn journal(&self) -> Vec<Event> {
        self.state().journal.clone()
    }

    /// Returns the number of contexts and buffer groups currently alive.
    pub fn live_handles(&self) -> (usize, usize) {
        let state = self.state();
        (state.live_contexts, state.live_groups)
    }

    /// Returns the parameters most recently wired through `configure`.
    pub fn configured_params(&self) -> Option<SessionParams> {
        self.state().configured.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fail(&self, point: FailPoint) -> BackendResult<()> {
        match self.state().fail {
            Some((p, kind)) if p == point => Err(kind.to_error()),
            _ => Ok(()),
        }
    }
}

impl crate::backend::Backend for Backend {
    type Context = Context;
    type Interface = Interface;
    type BufferGroup = BufferGroup;

    fn create_context(&self, coding: CodingMode) -> BackendResult<(Context, Interface)> {
        self.check_fail(FailPoint::CreateContext)?;

        let mut state = self.state();
        state.live_contexts += 1;
        state.journal.push(Event::ContextCreated(coding));

        Ok((
            Context {
                coding,
                params: None,
                pending: None,
            },
            Interface,
        ))
    }

    fn create_buffer_group(&self, kind: BufferGroupKind) -> BackendResult<BufferGroup> {
        let point = match kind {
            BufferGroupKind::Frame => FailPoint::CreateFrameGroup,
            BufferGroupKind::Packet => FailPoint::CreatePacketGroup,
        };
        self.check_fail(point)?;

        let mut state = self.state();
        state.live_groups += 1;
        state.journal.push(Event::BufferGroupCreated(kind));

        Ok(BufferGroup { kind })
    }

    fn configure(
        &self,
        context: &mut Context,
        _interface: &mut Interface,
        params: &SessionParams,
    ) -> BackendResult<()> {
        self.check_fail(FailPoint::Configure)?;

        context.params = Some(params.clone());

        let mut state = self.state();
        state.configured = Some(params.clone());
        state.journal.push(Event::Configured);

        Ok(())
    }

    fn submit_frame(
        &self,
        context: &mut Context,
        _interface: &mut Interface,
        _frame_group: &mut BufferGroup,
        nv12: &[u8],
    ) -> BackendResult<()> {
        self.check_fail(FailPoint::Submit)?;

        if context.coding != CodingMode::Encode {
            return Err(BackendError::Other(anyhow!(
                "frame submitted to a decode context"
            )));
        }

        context.pending = Some(nv12.to_vec());
        Ok(())
    }

    fn retrieve_packet(
        &self,
        context: &mut Context,
        _interface: &mut Interface,
        _packet_group: &mut BufferGroup,
        jpeg: &mut [u8],
    ) -> BackendResult<usize> {
        self.check_fail(FailPoint::Retrieve)?;

        let pending = context.pending.take().ok_or(BackendError::NotReady)?;
        let len = pending.len().min(jpeg.len());
        jpeg[..len].copy_from_slice(&pending[..len]);
        Ok(len)
    }

    fn submit_packet(
        &self,
        context: &mut Context,
        _interface: &mut Interface,
        _packet_group: &mut BufferGroup,
        jpeg: &[u8],
    ) -> BackendResult<()> {
        self.check_fail(FailPoint::Submit)?;

        if context.coding != CodingMode::Decode {
            return Err(BackendError::Other(anyhow!(
                "packet submitted to an encode context"
            )));
        }

        context.pending = Some(jpeg.to_vec());
        Ok(())
    }

    fn retrieve_frame(
        &self,
        context: &mut Context,
        _interface: &mut Interface,
        _frame_group: &mut BufferGroup,
        nv12: &mut [u8],
    ) -> BackendResult<RetrievedFrame> {
        self.check_fail(FailPoint::Retrieve)?;

        let params = context
            .params
            .clone()
            .ok_or_else(|| BackendError::Other(anyhow!("context was never configured")))?;

        let pending = context.pending.take().ok_or(BackendError::NotReady)?;
        let len = pending.len().min(nv12.len());
        nv12[..len].copy_from_slice(&pending[..len]);

        let mut state = self.state();
        let timestamp = state.next_timestamp;
        state.next_timestamp += 1;

        Ok(RetrievedFrame {
            len,
            resolution: params.resolution,
            format: HwFrameFormat::Yuv420Sp as u32,
            timestamp,
        })
    }

    fn release_buffer_group(&self, group: BufferGroup) {
        let mut state = self.state();
        state.live_groups -= 1;
        state.journal.push(Event::BufferGroupReleased(group.kind));
    }

    fn destroy_context(&self, _context: Context, _interface: Interface) {
        let mut state = self.state();
        state.live_contexts -= 1;
        state.journal.push(Event::ContextDestroyed);
    }
}
