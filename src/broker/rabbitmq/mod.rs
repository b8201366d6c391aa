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

//! The production broker: RabbitMQ transport, Celery-compatible wire
//! payload. Implements the two-queue model (durable task queue + transient
//! reply queue), correlation-id RPC with an out-of-order result cache, and
//! a worker consume loop with explicit ack.

mod cache;
mod pool;
mod topology;

use std::sync::Arc;

use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions};
use lapin::types::{FieldTable, ShortString};
use lapin::BasicProperties;

use crate::broker::Broker;
use crate::config::ConnectionSettings;
use crate::envelope::{JobStatus, ResultEnvelope, TaskEnvelope};
use crate::error::Error;
use crate::function::FunctionSpec;

use pool::{ConnectionEntry, ConnectionPool};

fn prop_string(opt: &Option<ShortString>) -> String {
    opt.as_ref().map(|s| s.to_string()).unwrap_or_default()
}

fn prop_priority(opt: &Option<u8>) -> u8 {
    opt.as_ref().copied().unwrap_or(0)
}

#[derive(Default)]
pub struct Builder {
    settings: ConnectionSettings,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.settings.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    pub fn user<S: Into<String>>(mut self, user: S) -> Self {
        self.settings.user = user.into();
        self
    }

    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.settings.password = password.into();
        self
    }

    pub fn vhost<S: Into<String>>(mut self, vhost: S) -> Self {
        self.settings.vhost = vhost.into();
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn settings(mut self, settings: ConnectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> RabbitMqBroker {
        RabbitMqBroker { settings: self.settings, pool: ConnectionPool::new() }
    }
}

/// The RabbitMQ/Celery-protocol broker.
pub struct RabbitMqBroker {
    settings: ConnectionSettings,
    pool: ConnectionPool,
}

impl RabbitMqBroker {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings, pool: ConnectionPool::new() }
    }

    fn entry(&self) -> Result<Arc<ConnectionEntry>, Error> {
        self.pool.get_or_connect(&self.settings)
    }

    fn decode_result(body: &[u8], expected_job_id: &str) -> Result<serde_json::Value, Error> {
        let envelope: ResultEnvelope = serde_json::from_slice(body)?;
        if envelope.task_id != expected_job_id {
            return Err(Error::Protocol(format!(
                "result task_id `{}` does not match expected job id `{}`",
                envelope.task_id, expected_job_id
            )));
        }
        match envelope.status {
            JobStatus::Success => Ok(envelope.result.unwrap_or(serde_json::Value::Null)),
            JobStatus::Failure => {
                Err(Error::Job(envelope.traceback.unwrap_or_else(|| "job failed with no traceback".to_string())))
            }
        }
    }

    fn publish_task(
        &self,
        entry: &ConnectionEntry,
        function: &FunctionSpec,
        args: serde_json::Value,
    ) -> Result<String, Error> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let reply_to = entry.reply_queue_name(function.name);

        topology::declare_task_queue(&entry.channel, function.name, function.lazy_queue)?;
        topology::declare_reply_queue(&entry.channel, &reply_to)?;

        let envelope = TaskEnvelope::new(job_id.clone(), function.name.to_string(), args, function.retries);
        let body = serde_json::to_vec(&envelope)?;

        let props = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_content_encoding("utf-8".into())
            .with_delivery_mode(2)
            .with_priority(function.priority.as_amqp_priority())
            .with_correlation_id(job_id.clone().into())
            .with_reply_to(reply_to.into());

        entry
            .channel
            .basic_publish(function.name, function.name, BasicPublishOptions::default(), body, props)
            .wait()?;

        Ok(job_id)
    }
}

impl Broker for RabbitMqBroker {
    fn run_job_async(&self, function: &FunctionSpec, args: serde_json::Value) -> Result<String, Error> {
        let entry = self.entry()?;
        self.publish_task(&entry, function, args)
    }

    fn run_job_sync(&self, function: &FunctionSpec, args: serde_json::Value) -> Result<serde_json::Value, Error> {
        let entry = self.entry()?;
        let job_id = self.publish_task(&entry, function, args)?;

        if let Some(body) = entry.with_result_cache(function.name, |cache| cache.take(&job_id)) {
            return Self::decode_result(&body, &job_id);
        }

        let reply_to = entry.reply_queue_name(function.name);
        let consumer = entry.reply_consumer(function.name, &reply_to)?;

        // A function's reply queue has exactly one consumer shared by every
        // concurrently-awaiting `run_job_sync` caller for it (two consumers
        // on the same queue would have RabbitMQ round-robin deliveries
        // between them, and a result delivered to the "wrong" consumer
        // would never reach the cache the other caller is reading from).
        // Whichever caller currently holds the consumer lock pulls exactly
        // one delivery, then releases it — on each iteration every blocked
        // caller gets to recheck its own cache entry before trying to drive
        // the consumer again.
        loop {
            if let Some(body) = entry.with_result_cache(function.name, |cache| cache.take(&job_id)) {
                return Self::decode_result(&body, &job_id);
            }

            let correlation_id;
            let body;
            {
                let mut consumer = consumer.lock().expect("reply consumer poisoned");
                let (_, delivery) = async_std::task::block_on(consumer.next())
                    .ok_or_else(|| Error::Protocol("reply queue consumer ended unexpectedly".to_string()))??;
                correlation_id = prop_string(delivery.properties.correlation_id());
                body = delivery.data;
            }

            if correlation_id.is_empty() {
                return Err(Error::Protocol("result message missing correlation_id".to_string()));
            }

            if correlation_id == job_id {
                return Self::decode_result(&body, &job_id);
            }

            entry.with_result_cache(function.name, |cache| cache.insert(correlation_id, body));
        }
    }

    fn start_worker(&self, function: &FunctionSpec) -> Result<(), Error> {
        let entry = self.entry()?;
        topology::declare_task_queue(&entry.channel, function.name, function.lazy_queue)?;

        let mut consumer = entry
            .channel
            .basic_consume(
                function.name,
                "",
                BasicConsumeOptions { no_ack: false, ..Default::default() },
                FieldTable::default(),
            )
            .wait()?;

        loop {
            Self::handle_one_delivery(&entry, function, &mut consumer)?;
        }
    }
}

impl RabbitMqBroker {
    fn handle_one_delivery(
        entry: &ConnectionEntry,
        function: &FunctionSpec,
        consumer: &mut lapin::Consumer,
    ) -> Result<(), Error> {
        let (_, delivery) = async_std::task::block_on(consumer.next())
            .ok_or_else(|| Error::Protocol("task queue consumer ended unexpectedly".to_string()))??;

        let correlation_id = prop_string(delivery.properties.correlation_id());
        let reply_to = prop_string(delivery.properties.reply_to());
        let priority = prop_priority(delivery.properties.priority());

        if correlation_id.is_empty() {
            return Err(Error::Protocol("task message missing correlation_id".to_string()));
        }
        if reply_to.is_empty() {
            return Err(Error::Protocol("task message missing reply_to".to_string()));
        }

        let task: TaskEnvelope = serde_json::from_slice(&delivery.data)?;
        if task.task != function.name {
            return Err(Error::Protocol(format!(
                "message for task `{}` delivered to worker serving `{}`",
                task.task, function.name
            )));
        }

        let celery_job_id = task.id.clone();
        let result = crate::runner::run_with_retries(function.name, &celery_job_id, function.retries, || {
            function.run(&task.kwargs)
        });

        // `publish_results = false` means exactly what it says: the worker
        // still runs the job and acks the task, but never declares the
        // reply queue or publishes a result envelope to it. A client that
        // calls `run_job_sync` against such a function has nothing to
        // consume and will block forever, which is the documented
        // trade-off of choosing `publish_results(false)` (fire-and-forget
        // functions are expected to be driven via `add_to_queue`, not
        // `run_remotely`).
        if let Some(result_envelope) = Self::result_envelope_to_publish(function, &celery_job_id, result) {
            topology::declare_reply_queue(&entry.channel, &reply_to)?;

            let body = serde_json::to_vec(&result_envelope)?;
            let props = BasicProperties::default()
                .with_content_type("application/json".into())
                .with_content_encoding("utf-8".into())
                .with_delivery_mode(1)
                .with_priority(priority)
                .with_correlation_id(celery_job_id.into());

            entry.channel.basic_publish("", &reply_to, BasicPublishOptions::default(), body, props).wait()?;
        }

        delivery.acker.ack(BasicAckOptions::default()).wait()?;
        Ok(())
    }

    /// The result envelope the worker should publish for this outcome, or
    /// `None` if `function.publish_results` is `false`. Split out from
    /// `handle_one_delivery` so the publish/no-publish decision is testable
    /// without a live broker.
    fn result_envelope_to_publish(
        function: &FunctionSpec,
        celery_job_id: &str,
        result: Result<serde_json::Value, crate::error::PerformError>,
    ) -> Option<ResultEnvelope> {
        if !function.publish_results {
            return None;
        }
        Some(match result {
            Ok(value) => ResultEnvelope::success(celery_job_id.to_string(), value),
            Err(err) => ResultEnvelope::failure(celery_job_id.to_string(), &err.to_string()),
        })
    }

    /// Consume and execute exactly one task delivery, then return. Only
    /// meaningful against a test broker: a production worker always runs
    /// `start_worker`'s unbounded loop instead.
    #[cfg(feature = "test_components")]
    pub fn run_one_job(&self, function: &FunctionSpec) -> Result<(), Error> {
        let entry = self.entry()?;
        topology::declare_task_queue(&entry.channel, function.name, function.lazy_queue)?;

        let mut consumer = entry
            .channel
            .basic_consume(
                function.name,
                "",
                BasicConsumeOptions { no_ack: false, ..Default::default() },
                FieldTable::default(),
            )
            .wait()?;

        Self::handle_one_delivery(&entry, function, &mut consumer)
    }
}
