use std::time::Duration;

use async_trait::async_trait;
use bb8::{ManageConnection, Pool, RunError};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, ToSql};
use tokio::{net::TcpStream, time::timeout};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{error, info, warn};
use url::Url;

use super::sql_type_wrapper::wrap_params;
use crate::{
    database::engine::{EngineError, SqlEngine},
    record::Value,
    writer::script::Script,
};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

const POOL_MAX_SIZE: u32 = 10;

/// SQL Server accepts 2100 parameters per request and `sp_executesql` takes two of them for
/// the statement text and its declarations.
pub const MAX_PARAMETERS: usize = 2098;

fn default_port() -> u16 {
    1433
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub secure: bool,

    pub username: String,

    #[serde(default)]
    pub password: String,

    pub dbname: String,
}

impl DatabaseInfo {
    /// `sqlserver://<user>:<pass>@<host>:<port>?database=<db>&tls=<bool>`, credentials
    /// percent-encoded.
    pub fn connection_string(&self) -> Result<String, SqlServerConnectionError> {
        let mut url = Url::parse(&format!("sqlserver://{}:{}", self.host, self.port))
            .map_err(|_| SqlServerConnectionError::CouldNotParseConnectionString)?;

        url.set_username(&self.username)
            .map_err(|_| SqlServerConnectionError::CouldNotParseConnectionString)?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| SqlServerConnectionError::CouldNotParseConnectionString)?;
        }

        url.query_pairs_mut()
            .append_pair("database", &self.dbname)
            .append_pair("tls", if self.secure { "true" } else { "false" });

        Ok(url.into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SqlServerConnectionError {
    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("Can not connect to the database please make sure the host and port are correct: {0}")]
    CanNotConnectToDatabase(#[from] std::io::Error),

    #[error("Timed out connecting to the database")]
    ConnectionTimeout,

    #[error("Database rejected the connection: {0}")]
    ConnectionRejected(#[from] tiberius::error::Error),
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Builds a tiberius config from a connection string produced by
/// [`DatabaseInfo::connection_string`].
pub fn config_from_connection_string(connection: &str) -> Result<Config, SqlServerConnectionError> {
    let url =
        Url::parse(connection).map_err(|_| SqlServerConnectionError::CouldNotParseConnectionString)?;

    if url.scheme() != "sqlserver" {
        return Err(SqlServerConnectionError::CouldNotParseConnectionString);
    }

    let host = url.host_str().ok_or(SqlServerConnectionError::CouldNotParseConnectionString)?;

    let mut config = Config::new();
    config.host(host);
    config.port(url.port().unwrap_or_else(default_port));

    let mut secure = false;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "database" => config.database(value.as_ref()),
            "tls" => secure = value == "true",
            _ => {}
        }
    }

    config.authentication(AuthMethod::sql_server(
        decode(url.username()),
        decode(url.password().unwrap_or_default()),
    ));

    if secure {
        config.encryption(EncryptionLevel::Required);
        config.trust_cert();
    } else {
        config.encryption(EncryptionLevel::NotSupported);
    }

    Ok(config)
}

/// tiberius declares the parameters of a request as `@P1`, `@P2`, ... and SQL Server resolves
/// variable names through the instance collation, so `@p1` only matches under a case-insensitive
/// one. Rewrites every `@p<n>` outside quoted text to `@P<n>`.
pub fn declared_placeholders(script: &str) -> String {
    let bytes = script.as_bytes();
    let mut declared = String::with_capacity(script.len());
    let mut quote: Option<u8> = None;
    let mut copied = 0;

    for (i, &byte) in bytes.iter().enumerate() {
        if let Some(open) = quote {
            if byte == open {
                quote = None;
            }
            continue;
        }

        match byte {
            b'\'' | b'"' => quote = Some(byte),
            b'@' if bytes.get(i + 1) == Some(&b'p')
                && bytes.get(i + 2).is_some_and(u8::is_ascii_digit) =>
            {
                declared.push_str(&script[copied..i]);
                declared.push_str("@P");
                copied = i + 2;
            }
            _ => {}
        }
    }

    declared.push_str(&script[copied..]);
    declared
}

/// Errors after which the session can no longer be trusted.
fn is_connection_lost(e: &tiberius::error::Error) -> bool {
    matches!(
        e,
        tiberius::error::Error::Io { .. }
            | tiberius::error::Error::Tls(_)
            | tiberius::error::Error::Protocol(_)
    )
}

async fn connect_client(config: Config) -> Result<Client<Compat<TcpStream>>, SqlServerConnectionError> {
    let connect = async {
        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write()).await?;
        Ok::<_, SqlServerConnectionError>(client)
    };

    match timeout(CONNECT_TIMEOUT, connect).await {
        Ok(Ok(client)) => Ok(client),
        Ok(Err(e)) => {
            error!("Error connecting to database: {}", e);
            Err(e)
        }
        Err(_) => {
            error!("Timeout connecting to database after {:?}", CONNECT_TIMEOUT);
            Err(SqlServerConnectionError::ConnectionTimeout)
        }
    }
}

/// One pooled session. Marked broken once the transport fails, so the pool drops it instead of
/// handing it out again.
pub struct SqlServerConnection {
    client: Client<Compat<TcpStream>>,
    broken: bool,
}

impl SqlServerConnection {
    fn track<T>(
        &mut self,
        outcome: Result<T, tiberius::error::Error>,
    ) -> Result<T, tiberius::error::Error> {
        if let Err(e) = &outcome {
            if is_connection_lost(e) {
                warn!("Database connection lost: {}", e);
                self.broken = true;
            }
        }
        outcome
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), tiberius::error::Error> {
        let outcome = match self.client.simple_query(sql).await {
            Ok(stream) => stream.into_results().await.map(|_| ()),
            Err(e) => Err(e),
        };
        self.track(outcome)
    }

    async fn execute(&mut self, script: &str, args: &[Value]) -> Result<u64, tiberius::error::Error> {
        let params = wrap_params(args);
        let refs: Vec<&dyn ToSql> = params.iter().map(|param| param as &dyn ToSql).collect();

        let outcome =
            self.client.execute(declared_placeholders(script), &refs).await.map(|result| result.total());
        self.track(outcome)
    }
}

pub struct SqlServerConnectionManager {
    config: Config,
}

impl SqlServerConnectionManager {
    pub fn new(config: Config) -> Self {
        SqlServerConnectionManager { config }
    }
}

impl ManageConnection for SqlServerConnectionManager {
    type Connection = SqlServerConnection;
    type Error = SqlServerConnectionError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let client = connect_client(self.config.clone()).await?;
        Ok(SqlServerConnection { client, broken: false })
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.broken
    }
}

/// Every checkout is validated, so a session that died while idle is replaced before use.
fn pool_builder<M: ManageConnection>() -> bb8::Builder<M> {
    Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_timeout(CONNECT_TIMEOUT)
        .test_on_check_out(true)
}

fn pool_error(e: RunError<SqlServerConnectionError>) -> SqlServerConnectionError {
    match e {
        RunError::User(e) => e,
        RunError::TimedOut => SqlServerConnectionError::ConnectionTimeout,
    }
}

pub struct SqlServerClient {
    pool: Pool<SqlServerConnectionManager>,
}

impl SqlServerClient {
    pub async fn new(info: &DatabaseInfo) -> Result<Self, SqlServerConnectionError> {
        info!(
            host = %info.host,
            port = info.port,
            secure = info.secure,
            username = %info.username,
            dbname = %info.dbname,
            "Connecting to database"
        );

        let connection_str = info.connection_string()?;
        Self::from_connection_string(&connection_str).await
    }

    pub async fn from_connection_string(
        connection_str: &str,
    ) -> Result<Self, SqlServerConnectionError> {
        let config = config_from_connection_string(connection_str)?;
        let pool = pool_builder().build(SqlServerConnectionManager::new(config)).await?;

        {
            // Perform a simple query to check the connection
            let mut conn = pool.get().await.map_err(pool_error)?;
            conn.batch_execute("SELECT 1").await?;
        }

        Ok(SqlServerClient { pool })
    }
}

#[async_trait]
impl SqlEngine for SqlServerClient {
    async fn execute(&self, script: &str, args: &[Value]) -> Result<u64, EngineError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;
        Ok(conn.execute(script, args).await?)
    }

    /// More than one script runs inside an explicit transaction on a single session.
    async fn execute_scripts(&self, scripts: &[Script]) -> Result<u64, EngineError> {
        let mut conn = self.pool.get().await.map_err(pool_error)?;

        if let [script] = scripts {
            return Ok(conn.execute(&script.sql, &script.args).await?);
        }

        conn.batch_execute("BEGIN TRANSACTION").await?;

        let mut total = 0;
        let mut outcome = Ok(());
        for script in scripts {
            match conn.execute(&script.sql, &script.args).await {
                Ok(rows) => total += rows,
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }
        if outcome.is_ok() {
            outcome = conn.batch_execute("COMMIT TRANSACTION").await;
        }

        if let Err(e) = outcome {
            if !conn.broken {
                if let Err(rollback) =
                    conn.batch_execute("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
                {
                    error!("Failed to roll back chunk transaction: {}", rollback);
                }
            }
            return Err(e.into());
        }

        Ok(total)
    }

    fn max_parameters(&self) -> usize {
        MAX_PARAMETERS
    }
}
