// Copyright 2018-2019 Parity Technologies (UK) Ltd.
// This file is part of jobrelay.

// jobrelay is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// jobrelay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with jobrelay.  If not, see <http://www.gnu.org/licenses/>.

//! Queue and exchange declarations. Declared idempotently on every publish
//! and on every worker start, exactly as spec requires — `lapin`'s declare
//! calls are themselves idempotent when the arguments match, so repeating
//! them costs a round-trip but never a conflict.

use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};

use crate::error::Error;

fn priority_args() -> FieldTable {
    let mut table = FieldTable::default();
    table.insert("x-max-priority".into(), AMQPValue::ShortShortUInt(3));
    table
}

/// The task queue's declare arguments: the shared priority argument, plus
/// `x-queue-mode: lazy` when the function asked for it — the same knob
/// `sa-work-queue::runner::QueueHandle::new` sets unconditionally on its
/// own queue declare.
pub(crate) fn task_queue_args(lazy_queue: bool) -> FieldTable {
    let mut table = priority_args();
    if lazy_queue {
        table.insert("x-queue-mode".into(), AMQPValue::LongString("lazy".into()));
    }
    table
}

/// Declare the durable task queue and its same-named durable exchange for
/// `function_name`, and bind the queue to the exchange with the function
/// name as routing key. `lazy_queue` sets `x-queue-mode: lazy` on the
/// queue declare per `FunctionSpec::lazy_queue`.
pub(crate) fn declare_task_queue(channel: &Channel, function_name: &str, lazy_queue: bool) -> Result<(), Error> {
    channel
        .exchange_declare(
            function_name,
            ExchangeKind::Direct,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .wait()?;

    channel
        .queue_declare(
            function_name,
            QueueDeclareOptions { durable: true, auto_delete: false, ..Default::default() },
            task_queue_args(lazy_queue),
        )
        .wait()?;

    channel
        .queue_bind(function_name, function_name, function_name, QueueBindOptions::default(), FieldTable::default())
        .wait()?;

    Ok(())
}

/// Declare a transient (non-durable, not auto-deleted) per-client reply
/// queue.
pub(crate) fn declare_reply_queue(channel: &Channel, queue_name: &str) -> Result<(), Error> {
    channel
        .queue_declare(
            queue_name,
            QueueDeclareOptions { durable: false, auto_delete: false, ..Default::default() },
            priority_args(),
        )
        .wait()?;
    Ok(())
}
