//! Assembling runnable services from configuration.
//!
//! A [`ServiceRegistry`] maps a service `kind` to the [`ServiceFactory`] that
//! builds it. The registry is an ordinary value built once at startup and
//! passed to whatever starts services.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::auth::Authenticator;
use crate::config::{ServiceConfig, TableConfig};
use crate::generate::{RowGenerator, SeededGenerator};
use crate::interp::{CustomPattern, Interpreter};
use crate::protocol::type_oid;
use crate::server::{Server, ServerOptions, TlsError, build_tls_acceptor};
use crate::store::{Field, FieldType, Schema, Store, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown service kind {0:?}")]
    UnknownKind(String),

    #[error("service {service}: {source}")]
    Store {
        service: String,
        #[source]
        source: StoreError,
    },

    #[error("service {service}: invalid query pattern {pattern:?}: {source}")]
    Pattern {
        service: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("service {service}: {source}")]
    Tls {
        service: String,
        #[source]
        source: TlsError,
    },

    #[error("service {service}: failed to listen on {listen}: {source}")]
    Bind {
        service: String,
        listen: String,
        #[source]
        source: io::Error,
    },
}

/// A bound service, ready to accept connections.
pub struct Service {
    name: String,
    server: Server,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.server.local_addr()
    }

    /// Serves until `shutdown` fires and open connections have drained.
    pub async fn run(self, shutdown: CancellationToken) {
        self.server.run(shutdown).await;
    }
}

/// Builds and binds one kind of service.
pub trait ServiceFactory: Send + Sync {
    fn build<'a>(
        &'a self,
        config: &'a ServiceConfig,
    ) -> BoxFuture<'a, Result<Service, ServiceError>>;
}

#[derive(Default)]
pub struct ServiceRegistry {
    factories: HashMap<String, Box<dyn ServiceFactory>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in kind registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("postgres", PostgresFactory::default());
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: impl ServiceFactory + 'static) {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub async fn build(&self, config: &ServiceConfig) -> Result<Service, ServiceError> {
        let factory = self
            .factories
            .get(&config.kind)
            .ok_or_else(|| ServiceError::UnknownKind(config.kind.clone()))?;
        factory.build(config).await
    }
}

/// Builds PostgreSQL-wire services backed by an in-memory store.
pub struct PostgresFactory {
    generator: Box<dyn RowGenerator>,
}

impl Default for PostgresFactory {
    fn default() -> Self {
        Self::new(Box::new(SeededGenerator))
    }
}

impl PostgresFactory {
    pub fn new(generator: Box<dyn RowGenerator>) -> Self {
        Self { generator }
    }

    fn interpreter(&self, config: &ServiceConfig) -> Result<Interpreter, ServiceError> {
        let store_err = |source| ServiceError::Store {
            service: config.name.clone(),
            source,
        };

        let store = Arc::new(Store::new());
        for table in &config.tables {
            let schema = table_schema(table).map_err(store_err)?;
            store.create_table(schema).map_err(store_err)?;
            let rows = self.generator.generate(table);
            let count = rows.len();
            for row in rows {
                store.insert(&table.name, row).map_err(store_err)?;
            }
            info!(service = %config.name, table = %table.name, rows = count, "seeded table");
        }

        let mut interpreter = Interpreter::new(store);
        for table in &config.tables {
            for column in &table.columns {
                let oid = type_oid::for_type_name(&column.ty);
                interpreter.set_column_type(&table.name, &column.name, oid);
            }
        }
        for query in &config.queries {
            let where_clause = query.where_clause.clone();
            let pattern = CustomPattern::new(&query.pattern, &query.from_table, where_clause)
                .map_err(|source| ServiceError::Pattern {
                    service: config.name.clone(),
                    pattern: query.pattern.clone(),
                    source,
                })?;
            interpreter.add_pattern(pattern);
        }
        Ok(interpreter)
    }

    async fn start(&self, config: &ServiceConfig) -> Result<Service, ServiceError> {
        let interpreter = Arc::new(self.interpreter(config)?);
        let auth = Authenticator::new(config.auth.users.clone(), config.auth.database.clone());

        let mut options = ServerOptions::new(&config.name, &config.listen);
        if let Some(tls) = &config.tls {
            let acceptor =
                build_tls_acceptor(&tls.cert, &tls.key).map_err(|source| ServiceError::Tls {
                    service: config.name.clone(),
                    source,
                })?;
            options = options.with_tls(acceptor);
        }

        let server = Server::bind(options, interpreter, auth)
            .await
            .map_err(|source| ServiceError::Bind {
                service: config.name.clone(),
                listen: config.listen.clone(),
                source,
            })?;

        Ok(Service {
            name: config.name.clone(),
            server,
        })
    }
}

impl ServiceFactory for PostgresFactory {
    fn build<'a>(
        &'a self,
        config: &'a ServiceConfig,
    ) -> BoxFuture<'a, Result<Service, ServiceError>> {
        Box::pin(self.start(config))
    }
}

fn table_schema(table: &TableConfig) -> Result<Schema, StoreError> {
    let pk = table.primary_key_index();
    let fields = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let field = Field::new(&column.name, FieldType::from_type_name(&column.ty));
            let field = if i == pk { field.primary_key() } else { field };
            if column.indexed { field.indexed() } else { field }
        })
        .collect();
    Schema::new(&table.name, fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::interp::SessionInfo;

    const CONFIG: &str = r#"
[[services]]
name = "users-db"
listen = "127.0.0.1:0"

[[services.tables]]
name = "user"
row_count = 5
seed = 42
columns = [
    { name = "id", type = "uuid" },
    { name = "name", values = ["Alice", "Bob"], indexed = true },
]

[[services.queries]]
pattern = "select * from people where name = *"
from_table = "users"
where = "name = '${2}'"
"#;

    fn service_config() -> ServiceConfig {
        let config: Config = CONFIG.parse().unwrap();
        config.services.into_iter().next().unwrap()
    }

    #[test]
    fn test_interpreter_is_seeded_from_config() {
        let interpreter = PostgresFactory::default().interpreter(&service_config()).unwrap();
        let session = SessionInfo::new("u", "d");

        let all = interpreter.execute("select * from users", &session).unwrap().unwrap();
        assert_eq!(all.tag, "SELECT 5");
        assert_eq!(all.columns[0].type_oid, type_oid::UUID);
        assert_eq!(all.columns[1].type_oid, type_oid::TEXT);

        let alices = interpreter
            .execute("select * from people where name = 'Alice'", &session)
            .unwrap()
            .unwrap();
        let direct = interpreter
            .execute("select * from users where name = 'Alice'", &session)
            .unwrap()
            .unwrap();
        assert_eq!(alices.rows, direct.rows);
    }

    #[tokio::test]
    async fn test_registry_builds_known_kinds_only() {
        let registry = ServiceRegistry::with_defaults();
        assert_eq!(registry.kinds(), vec!["postgres"]);

        let service = registry.build(&service_config()).await.unwrap();
        assert_eq!(service.name(), "users-db");
        assert_ne!(service.local_addr().unwrap().port(), 0);

        let mut unknown = service_config();
        unknown.kind = "redis".to_string();
        assert!(matches!(
            registry.build(&unknown).await,
            Err(ServiceError::UnknownKind(kind)) if kind == "redis"
        ));
    }

    #[test]
    fn test_table_schema_marks_keys_and_indexes() {
        let config = service_config();
        let schema = table_schema(&config.tables[0]).unwrap();
        assert_eq!(schema.primary_key().name, "id");
        assert!(schema.field("name").unwrap().indexed);
    }
}
