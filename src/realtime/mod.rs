// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lock-free scalar types shared between the mixer thread and callers
//! (engine feedback snapshots, soft master volume, measured output
//! delay). Ported from the teacher's `realtime::atomic_params` module
//! and trimmed to the wrappers this crate actually uses — the mixer
//! thread writes, readers snapshot without blocking it.

mod atomic;

pub use atomic::{AtomicBool, AtomicF32, AtomicI32};
