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

//! Connection pool keyed by `(process id, host, port, user, password,
//! vhost, timeout)`. Channels are not safe to share across forks, so the
//! process id is part of the key: a fork transparently observes a pool
//! miss and opens a fresh connection and channel on first use, the same
//! way `sa-work-queue::threadpool::ConsumerHandle` lazily (re)initializes
//! its thread-local consumer on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_amqp::LapinAsyncStdExt;
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};

use crate::config::ConnectionSettings;
use crate::error::Error;

use super::cache::ResultCache;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionKey {
    process_id: u32,
    host: String,
    port: u16,
    user: String,
    password: String,
    vhost: String,
    timeout: Duration,
}

impl ConnectionKey {
    pub(crate) fn current(settings: &ConnectionSettings) -> Self {
        Self {
            process_id: std::process::id(),
            host: settings.host.clone(),
            port: settings.port,
            user: settings.user.clone(),
            password: settings.password.clone(),
            vhost: settings.vhost.clone(),
            timeout: settings.timeout,
        }
    }
}

/// Per-connection state: the live AMQP connection and channel, and the
/// per-function reply queue names and result caches that live as long as
/// the connection does.
pub(crate) struct ConnectionEntry {
    pub(crate) connection: Connection,
    pub(crate) channel: Channel,
    pub(crate) reply_queues: Mutex<HashMap<String, String>>,
    pub(crate) result_caches: Mutex<HashMap<String, ResultCache>>,
    /// One shared reply-queue consumer per function, so that concurrent
    /// `run_job_sync` callers for the same function never register two
    /// AMQP consumers on the same queue — RabbitMQ round-robins deliveries
    /// across consumers on a queue, so a second consumer would steal
    /// messages the first is waiting for and neither waiter's result cache
    /// would ever see them. All callers take turns driving this one
    /// consumer (see `RabbitMqBroker::run_job_sync`), caching whatever
    /// isn't theirs for whoever is waiting on it.
    pub(crate) reply_consumers: Mutex<HashMap<String, Arc<Mutex<Consumer>>>>,
}

impl ConnectionEntry {
    fn connect(settings: &ConnectionSettings) -> Result<Self, Error> {
        let uri = settings.amqp_uri();
        let props = ConnectionProperties::default().with_async_std();
        let connection = async_std::task::block_on(async_std::future::timeout(
            settings.timeout,
            Connection::connect(&uri, props),
        ))
        .map_err(|_| Error::Msg(format!("timed out connecting to {}:{}", settings.host, settings.port)))??;

        let channel = connection.create_channel().wait()?;
        channel.basic_qos(1, lapin::options::BasicQosOptions::default()).wait()?;

        Ok(Self {
            connection,
            channel,
            reply_queues: Mutex::new(HashMap::new()),
            result_caches: Mutex::new(HashMap::new()),
            reply_consumers: Mutex::new(HashMap::new()),
        })
    }

    /// The reply queue name for `function_name` on this connection,
    /// minting a fresh UUID the first time it's needed.
    pub(crate) fn reply_queue_name(&self, function_name: &str) -> String {
        let mut queues = self.reply_queues.lock().expect("reply queue map poisoned");
        queues.entry(function_name.to_string()).or_insert_with(|| uuid::Uuid::new_v4().to_string()).clone()
    }

    pub(crate) fn with_result_cache<R>(&self, function_name: &str, f: impl FnOnce(&mut ResultCache) -> R) -> R {
        let mut caches = self.result_caches.lock().expect("result cache map poisoned");
        let cache = caches.entry(function_name.to_string()).or_insert_with(ResultCache::new);
        f(cache)
    }

    /// The single shared reply-queue consumer for `function_name`, opening
    /// it against `reply_to` the first time it's needed.
    pub(crate) fn reply_consumer(&self, function_name: &str, reply_to: &str) -> Result<Arc<Mutex<Consumer>>, Error> {
        let mut consumers = self.reply_consumers.lock().expect("reply consumer map poisoned");
        if let Some(consumer) = consumers.get(function_name) {
            return Ok(consumer.clone());
        }
        let consumer = self
            .channel
            .basic_consume(
                reply_to,
                "",
                BasicConsumeOptions { no_ack: true, ..Default::default() },
                FieldTable::default(),
            )
            .wait()?;
        let consumer = Arc::new(Mutex::new(consumer));
        consumers.insert(function_name.to_string(), consumer.clone());
        Ok(consumer)
    }
}

/// Pool of live connections keyed by `(pid, host, port, user, password,
/// vhost, timeout)`. A single live connection and channel (channel number
/// 1) is held per key.
#[derive(Default)]
pub(crate) struct ConnectionPool {
    connections: Mutex<HashMap<ConnectionKey, Arc<ConnectionEntry>>>,
}

impl ConnectionPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry for `settings`, connecting on a pool miss. A miss
    /// always starts with empty reply-queue and result-cache maps, which
    /// is exactly what a fresh connection after a fork needs: the old
    /// parent-process maps are never visible to the child.
    pub(crate) fn get_or_connect(&self, settings: &ConnectionSettings) -> Result<Arc<ConnectionEntry>, Error> {
        let key = ConnectionKey::current(settings);
        let mut connections = self.connections.lock().expect("connection pool poisoned");
        if let Some(entry) = connections.get(&key) {
            return Ok(entry.clone());
        }
        let entry = Arc::new(ConnectionEntry::connect(settings)?);
        connections.insert(key, entry.clone());
        Ok(entry)
    }
}
