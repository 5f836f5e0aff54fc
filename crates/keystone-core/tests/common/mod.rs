// SPDX-License-Identifier: Apache-2.0
// © Emberfall Project Contributors
//! Shared fakes for the integration suites.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use keystone_core::{
    CapturedState, GameSystem, RestoreResult, SnapshotDesc, SnapshotManager, SnapshotSource,
    SystemFault, SystemId, TxId, TxParticipant,
};

/// Byte-buffer state shared between a test and its snapshot source.
#[derive(Debug)]
pub struct BufState {
    pub bytes: Vec<u8>,
    pub version: u32,
    pub fail_capture: bool,
}

pub struct BufSource(pub Rc<RefCell<BufState>>);

impl BufSource {
    pub fn new(bytes: Vec<u8>, version: u32) -> (Self, Rc<RefCell<BufState>>) {
        let state = Rc::new(RefCell::new(BufState {
            bytes,
            version,
            fail_capture: false,
        }));
        (Self(state.clone()), state)
    }
}

impl SnapshotSource for BufSource {
    fn capture(&mut self) -> Result<CapturedState, SystemFault> {
        let state = self.0.borrow();
        if state.fail_capture {
            return Err(SystemFault::new("capture rigged to fail"));
        }
        Ok(CapturedState {
            bytes: state.bytes.clone(),
            version: state.version,
        })
    }

    fn restore(&mut self, bytes: &[u8], version: u32) -> RestoreResult {
        let mut state = self.0.borrow_mut();
        state.bytes = bytes.to_vec();
        state.version = version;
        RestoreResult::Applied
    }
}

/// Registers a `BufSource` under `id`, returning the shared state handle.
pub fn register_buf(
    snapshots: &mut SnapshotManager,
    id: u32,
    bytes: Vec<u8>,
) -> Rc<RefCell<BufState>> {
    let (source, state) = BufSource::new(bytes, 1);
    snapshots
        .register(
            SnapshotDesc {
                system_id: SystemId::from_raw(id),
                name: format!("sys-{id}"),
                max_size: 0,
            },
            Box::new(source),
        )
        .expect("register snapshot endpoint");
    state
}

/// An i32 value exposed as a little-endian snapshot payload, mirroring how a
/// gameplay struct round-trips through capture/restore.
#[derive(Debug)]
pub struct ValueState {
    pub value: i32,
    pub version: u32,
}

pub struct ValueSource(pub Rc<RefCell<ValueState>>);

impl ValueSource {
    pub fn new(value: i32) -> (Self, Rc<RefCell<ValueState>>) {
        let state = Rc::new(RefCell::new(ValueState { value, version: 0 }));
        (Self(state.clone()), state)
    }
}

impl SnapshotSource for ValueSource {
    fn capture(&mut self) -> Result<CapturedState, SystemFault> {
        let mut state = self.0.borrow_mut();
        state.version += 1;
        Ok(CapturedState {
            bytes: state.value.to_le_bytes().to_vec(),
            version: state.version,
        })
    }

    fn restore(&mut self, bytes: &[u8], _version: u32) -> RestoreResult {
        let Ok(raw) = <[u8; 4]>::try_from(bytes) else {
            return RestoreResult::Failed(SystemFault::new("payload size mismatch"));
        };
        self.0.borrow_mut().value = i32::from_le_bytes(raw);
        RestoreResult::Applied
    }
}

/// Observable participant behavior, driven and inspected by tests.
#[derive(Debug, Default)]
pub struct ParticipantProbe {
    pub version: u32,
    pub prepare_calls: Vec<TxId>,
    pub commit_calls: Vec<TxId>,
    pub abort_calls: Vec<TxId>,
    pub fail_prepare: bool,
    pub fail_commit: bool,
    pub prepare_message: String,
}

pub struct Participant(pub Rc<RefCell<ParticipantProbe>>);

impl Participant {
    pub fn new(version: u32) -> (Self, Rc<RefCell<ParticipantProbe>>) {
        let probe = Rc::new(RefCell::new(ParticipantProbe {
            version,
            prepare_message: "staging rejected".to_owned(),
            ..ParticipantProbe::default()
        }));
        (Self(probe.clone()), probe)
    }
}

impl TxParticipant for Participant {
    fn prepare(&mut self, tx: TxId) -> Result<u32, SystemFault> {
        let mut probe = self.0.borrow_mut();
        probe.prepare_calls.push(tx);
        if probe.fail_prepare {
            return Err(SystemFault::new(probe.prepare_message.clone()));
        }
        Ok(probe.version)
    }

    fn commit(&mut self, tx: TxId) -> Result<(), SystemFault> {
        let mut probe = self.0.borrow_mut();
        probe.commit_calls.push(tx);
        if probe.fail_commit {
            return Err(SystemFault::new("commit rigged to fail"));
        }
        Ok(())
    }

    fn abort(&mut self, tx: TxId) {
        self.0.borrow_mut().abort_calls.push(tx);
    }

    fn version(&self) -> u32 {
        self.0.borrow().version
    }
}

/// Observable game-system behavior for registry tests.
#[derive(Debug, Default)]
pub struct SystemProbe {
    pub init_calls: u32,
    pub update_calls: u32,
    pub shutdown_calls: u32,
    pub fail_init: bool,
    pub last_dt_ms: f64,
}

pub struct ProbeSystem(pub Rc<RefCell<SystemProbe>>);

impl ProbeSystem {
    pub fn new() -> (Self, Rc<RefCell<SystemProbe>>) {
        let probe = Rc::new(RefCell::new(SystemProbe::default()));
        (Self(probe.clone()), probe)
    }
}

impl GameSystem for ProbeSystem {
    fn init(&mut self) -> Result<(), SystemFault> {
        let mut probe = self.0.borrow_mut();
        probe.init_calls += 1;
        if probe.fail_init {
            return Err(SystemFault::new("init rigged to fail"));
        }
        Ok(())
    }

    fn update(&mut self, dt_ms: f64) {
        let mut probe = self.0.borrow_mut();
        probe.update_calls += 1;
        probe.last_dt_ms = dt_ms;
    }

    fn shutdown(&mut self) {
        self.0.borrow_mut().shutdown_calls += 1;
    }

    fn state(&self) -> &dyn std::any::Any {
        self
    }

    fn debug_info(&self) -> String {
        format!("updates={}", self.0.borrow().update_calls)
    }
}
