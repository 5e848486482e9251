//! Redis ledger and settings
//!
//! Key layout (prefix `rentbill` by default):
//!
//! ```text
//! {p}:order:{id}           JSON order document
//! {p}:orders:all           SET of order ids
//! {p}:orders:live          SET of non-deleted order ids
//! {p}:orders:user:{uid}    SET of a user's order ids
//! {p}:wallet:{uid}         integer balance, mutated with INCRBY
//! {p}:invoice:seq          invoice id counter
//! {p}:invoice:{id}         JSON invoice
//! {p}:invoices:user:{uid}  LIST of a user's invoice ids
//! {p}:settings             HASH of runtime settings
//! {p}:schema_version       integer
//! ```

use crate::migrate::MigrationTarget;
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use rentbill_common::{
    gateway::{LedgerGateway, SettingsStore},
    now_ts, Grace, Invoice, NewInvoice, Order, OrderStatus, RentbillError, Result, Timestamp,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Compare-and-set of one order document.
///
/// KEYS: order key, live index. ARGV: document as read, new document,
/// `1` when the new document is live, order id. Returns 0 when the
/// stored document no longer matches.
const ORDER_CAS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[2])
if ARGV[3] == '1' then
  redis.call('SADD', KEYS[2], ARGV[4])
else
  redis.call('SREM', KEYS[2], ARGV[4])
end
return 1
"#;

/// Conflicting writers tolerated before an order update gives up
const MAX_ORDER_WRITE_ATTEMPTS: u32 = 8;

fn storage_err(op: &str) -> impl Fn(redis::RedisError) -> RentbillError + '_ {
    move |e| RentbillError::Storage(format!("Redis {} failed: {}", op, e))
}

/// Shared multiplexed connection with lazy reconnect
#[derive(Clone)]
struct RedisPool {
    client: Client,
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
}

impl RedisPool {
    async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| RentbillError::Config(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RentbillError::Storage(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(Some(connection))),
        })
    }

    async fn get(&self) -> Result<MultiplexedConnection> {
        let guard = self.connection.read().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        drop(guard);

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RentbillError::Storage(format!("Failed to reconnect to Redis: {}", e)))?;

        *guard = Some(connection.clone());
        Ok(connection)
    }
}

/// Ledger backed by Redis
pub struct RedisLedger {
    pool: RedisPool,
    prefix: String,
}

impl RedisLedger {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        Ok(Self {
            pool: RedisPool::connect(redis_url).await?,
            prefix: "rentbill".to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Settings store sharing this ledger's connection and prefix
    pub fn settings(&self) -> RedisSettings {
        RedisSettings {
            pool: self.pool.clone(),
            key: format!("{}:settings", self.prefix),
        }
    }

    fn order_key(&self, order_id: i64) -> String {
        format!("{}:order:{}", self.prefix, order_id)
    }

    fn wallet_key(&self, user_id: i64) -> String {
        format!("{}:wallet:{}", self.prefix, user_id)
    }

    fn user_orders_key(&self, user_id: i64) -> String {
        format!("{}:orders:user:{}", self.prefix, user_id)
    }

    fn all_orders_key(&self) -> String {
        format!("{}:orders:all", self.prefix)
    }

    fn live_orders_key(&self) -> String {
        format!("{}:orders:live", self.prefix)
    }

    /// Write an order document and keep the id indexes in step
    #[instrument(skip(self, order), fields(order_id = order.id))]
    pub async fn put_order(&self, order: &Order) -> Result<()> {
        let json = serde_json::to_string(order)?;
        let mut conn = self.pool.get().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.order_key(order.id), json)
            .ignore()
            .sadd(self.all_orders_key(), order.id)
            .ignore()
            .sadd(self.user_orders_key(order.user_id), order.id)
            .ignore();
        if order.is_live() {
            pipe.sadd(self.live_orders_key(), order.id).ignore();
        } else {
            pipe.srem(self.live_orders_key(), order.id).ignore();
        }

        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(storage_err("order write"))?;
        Ok(())
    }

    async fn load_orders(&self, ids: Vec<i64>) -> Result<Vec<Order>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.order_key(*id)).collect();
        let mut conn = self.pool.get().await?;

        let docs: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(storage_err("MGET"))?;

        let mut orders = Vec::with_capacity(docs.len());
        for (id, doc) in ids.iter().zip(docs) {
            let Some(json) = doc else {
                warn!(order_id = *id, "Indexed order has no document");
                continue;
            };
            orders.push(serde_json::from_str::<Order>(&json)?);
        }
        orders.sort_by_key(|o| o.id);
        Ok(orders)
    }

    /// Read-modify-write of one order, retried while another writer races it
    async fn modify_order<F>(&self, order_id: i64, f: F) -> Result<()>
    where
        F: Fn(&mut Order) + Send + Sync,
    {
        let key = self.order_key(order_id);
        let script = redis::Script::new(ORDER_CAS_SCRIPT);
        let mut conn = self.pool.get().await?;

        for attempt in 1..=MAX_ORDER_WRITE_ATTEMPTS {
            let current: Option<String> = conn
                .get(&key)
                .await
                .map_err(storage_err("GET order"))?;
            let current =
                current.ok_or_else(|| RentbillError::NotFound(format!("order {}", order_id)))?;

            let mut order: Order = serde_json::from_str(&current)?;
            f(&mut order);
            let next = serde_json::to_string(&order)?;

            let mut invocation = script.prepare_invoke();
            invocation
                .key(&key)
                .key(self.live_orders_key())
                .arg(&current)
                .arg(&next)
                .arg(if order.is_live() { 1 } else { 0 })
                .arg(order_id);
            let written: i64 = invocation
                .invoke_async(&mut conn)
                .await
                .map_err(storage_err("order compare-and-set"))?;
            if written == 1 {
                return Ok(());
            }
            debug!(order_id, attempt, "Order changed underneath, retrying");
        }

        Err(RentbillError::Storage(format!(
            "order {} changed on every one of {} write attempts",
            order_id, MAX_ORDER_WRITE_ATTEMPTS
        )))
    }
}

#[async_trait]
impl LedgerGateway for RedisLedger {
    async fn get_wallet_balance(&self, user_id: i64) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let balance: Option<i64> = conn
            .get(self.wallet_key(user_id))
            .await
            .map_err(storage_err("GET wallet"))?;
        Ok(balance.unwrap_or(0))
    }

    #[instrument(skip(self))]
    async fn adjust_wallet_balance(&self, user_id: i64, delta: i64) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let balance: i64 = conn
            .incr(self.wallet_key(user_id), delta)
            .await
            .map_err(storage_err("INCRBY wallet"))?;
        debug!(user_id, delta, balance, "Wallet adjusted");
        Ok(balance)
    }

    #[instrument(skip(self, invoice), fields(user_id = invoice.user_id))]
    async fn record_invoice(&self, invoice: NewInvoice) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let id: i64 = conn
            .incr(format!("{}:invoice:seq", self.prefix), 1)
            .await
            .map_err(storage_err("INCR invoice seq"))?;

        let user_id = invoice.user_id;
        let json = serde_json::to_string(&Invoice::from_new(id, now_ts(), invoice))?;

        redis::pipe()
            .atomic()
            .set(format!("{}:invoice:{}", self.prefix, id), json)
            .ignore()
            .rpush(format!("{}:invoices:user:{}", self.prefix, user_id), id)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(storage_err("invoice write"))?;
        Ok(id)
    }

    async fn list_live_orders(&self) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let ids: Vec<i64> = conn
            .smembers(self.live_orders_key())
            .await
            .map_err(storage_err("SMEMBERS live"))?;
        let orders = self.load_orders(ids).await?;
        Ok(orders.into_iter().filter(Order::is_live).collect())
    }

    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let ids: Vec<i64> = conn
            .smembers(self.user_orders_key(user_id))
            .await
            .map_err(storage_err("SMEMBERS user"))?;
        self.load_orders(ids).await
    }

    async fn get_order(&self, order_id: i64) -> Result<Option<Order>> {
        let mut conn = self.pool.get().await?;
        let doc: Option<String> = conn
            .get(self.order_key(order_id))
            .await
            .map_err(storage_err("GET order"))?;
        doc.map(|json| serde_json::from_str(&json).map_err(RentbillError::from))
            .transpose()
    }

    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<()> {
        self.modify_order(order_id, |o| o.status = status).await
    }

    async fn update_order_checkpoint(
        &self,
        order_id: i64,
        last_hourly_charge_at: Option<Timestamp>,
        last_warn_at: Option<Timestamp>,
    ) -> Result<()> {
        self.modify_order(order_id, |o| {
            if let Some(ts) = last_hourly_charge_at {
                o.last_hourly_charge_at = Some(ts);
            }
            if let Some(ts) = last_warn_at {
                o.last_warn_at = Some(ts);
            }
        })
        .await
    }

    async fn set_order_suspended_balance(
        &self,
        order_id: i64,
        suspended_at: Timestamp,
        delete_at: Option<Timestamp>,
    ) -> Result<()> {
        self.modify_order(order_id, |o| {
            o.status = OrderStatus::SuspendedBalance {
                suspended_at,
                grace: delete_at.map_or(Grace::Indefinite, Grace::Until),
            }
        })
        .await
    }

    async fn clear_order_suspension(&self, order_id: i64) -> Result<()> {
        self.modify_order(order_id, |o| {
            if matches!(o.status, OrderStatus::SuspendedBalance { .. }) {
                o.status = OrderStatus::Active;
            }
        })
        .await
    }

    async fn update_order_traffic(&self, order_id: i64, used_gb: f64, ts: Timestamp) -> Result<()> {
        self.modify_order(order_id, |o| {
            o.traffic_used_gb = used_gb;
            o.traffic_last_ts = ts;
        })
        .await
    }
}

#[async_trait]
impl MigrationTarget for RedisLedger {
    async fn schema_version(&self) -> Result<u32> {
        let mut conn = self.pool.get().await?;
        let version: Option<u32> = conn
            .get(format!("{}:schema_version", self.prefix))
            .await
            .map_err(storage_err("GET schema_version"))?;
        Ok(version.unwrap_or(0))
    }

    async fn set_schema_version(&self, version: u32) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.set::<_, _, ()>(format!("{}:schema_version", self.prefix), version)
            .await
            .map_err(storage_err("SET schema_version"))
    }

    async fn raw_order_records(&self) -> Result<Vec<(i64, String)>> {
        let mut conn = self.pool.get().await?;
        let ids: Vec<i64> = conn
            .smembers(self.all_orders_key())
            .await
            .map_err(storage_err("SMEMBERS all"))?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let doc: Option<String> = conn
                .get(self.order_key(id))
                .await
                .map_err(storage_err("GET order"))?;
            if let Some(raw) = doc {
                records.push((id, raw));
            }
        }
        Ok(records)
    }

    async fn replace_order(&self, order: Order) -> Result<()> {
        self.put_order(&order).await
    }
}

/// Settings hash in Redis
#[derive(Clone)]
pub struct RedisSettings {
    pool: RedisPool,
    key: String,
}

impl RedisSettings {
    pub async fn connect(redis_url: &str, prefix: &str) -> Result<Self> {
        Ok(Self {
            pool: RedisPool::connect(redis_url).await?,
            key: format!("{}:settings", prefix),
        })
    }
}

#[async_trait]
impl SettingsStore for RedisSettings {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        conn.hget(&self.key, key)
            .await
            .map_err(storage_err("HGET setting"))
    }
}
