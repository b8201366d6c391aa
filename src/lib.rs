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

//! Submit named jobs to workers over a message broker.
//!
//! Clients submit work to a [`FunctionSpec`] one of three ways:
//! in-process ([`FunctionSpec::run_locally`]), synchronous RPC over the
//! broker ([`FunctionSpec::run_remotely`]), or fire-and-forget
//! ([`FunctionSpec::add_to_queue`]). The production [`Broker`] is
//! [`broker::rabbitmq::RabbitMqBroker`], which speaks a Celery-compatible
//! wire protocol over AMQP 0-9-1.

pub mod broker;
pub mod config;
pub mod envelope;
pub mod error;
pub mod function;
pub mod identity;
pub mod runner;

pub use broker::Broker;
pub use config::{ConnectionSettings, Configuration};
pub use envelope::{JobStatus, Priority, ResultEnvelope, TaskEnvelope};
pub use error::{Error, PerformError};
pub use function::FunctionSpec;
pub use identity::{job_id_from_handle, path_safe_job_id, unique_job_id};
