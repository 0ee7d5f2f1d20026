use std::fmt;

/// Failure categories surfaced by the order store
#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    /// Connection pool is exhausted
    PoolExhausted,
    /// Connection timeout
    ConnectionTimeout,
    /// Record not found
    NotFound { entity: String, id: String },
    /// Row decoded into a value the domain cannot represent
    CorruptRow { entity: String, message: String },
    /// Query execution error
    QueryError { message: String },
    /// Begin/commit/rollback failed or was attempted twice
    TransactionError { message: String },
    /// Database connection error
    ConnectionError { message: String },
    /// Configuration error
    ConfigError { message: String },
    /// Unknown error
    Unknown { message: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub context: Option<String>,
    pub is_retryable: bool,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        let is_retryable = matches!(
            kind,
            DatabaseErrorKind::ConnectionTimeout
                | DatabaseErrorKind::PoolExhausted
                | DatabaseErrorKind::ConnectionError { .. }
                | DatabaseErrorKind::TransactionError { .. }
        );

        Self {
            kind,
            context: None,
            is_retryable,
        }
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.is_retryable
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::NotFound { .. })
    }

    /// Map SQLx error to our custom error type
    #[cfg(feature = "database")]
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            }),
            sqlx::Error::PoolTimedOut => Self::new(DatabaseErrorKind::PoolExhausted),
            sqlx::Error::PoolClosed => Self::new(DatabaseErrorKind::ConnectionError {
                message: "Connection pool is closed".to_string(),
            }),
            sqlx::Error::Configuration(msg) => Self::new(DatabaseErrorKind::ConfigError {
                message: msg.to_string(),
            }),
            sqlx::Error::Database(db_err) => {
                // 40001 serialization_failure, 40P01 deadlock_detected
                match db_err.code().as_deref() {
                    Some("40001") | Some("40P01") => {
                        Self::new(DatabaseErrorKind::TransactionError {
                            message: db_err.message().to_string(),
                        })
                    }
                    _ => Self::new(DatabaseErrorKind::QueryError {
                        message: db_err.message().to_string(),
                    }),
                }
            }
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(DatabaseErrorKind::CorruptRow {
                    entity: format!("column {}", index),
                    message: source.to_string(),
                })
            }
            sqlx::Error::Io(io_err) => Self::new(DatabaseErrorKind::ConnectionError {
                message: io_err.to_string(),
            }),
            _ => Self::new(DatabaseErrorKind::Unknown {
                message: error.to_string(),
            }),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match &self.kind {
            DatabaseErrorKind::PoolExhausted => {
                "Database connection pool exhausted. Please try again.".to_string()
            }
            DatabaseErrorKind::ConnectionTimeout => {
                "Database connection timed out. Please try again.".to_string()
            }
            DatabaseErrorKind::NotFound { entity, id } => {
                format!("{} with ID '{}' not found", entity, id)
            }
            DatabaseErrorKind::CorruptRow { entity, message } => {
                format!("Stored {} could not be decoded: {}", entity, message)
            }
            DatabaseErrorKind::QueryError { message } => {
                format!("Database query failed: {}", message)
            }
            DatabaseErrorKind::TransactionError { message } => {
                format!("Transaction failed: {}", message)
            }
            DatabaseErrorKind::ConnectionError { message } => {
                format!("Database connection error: {}", message)
            }
            DatabaseErrorKind::ConfigError { message } => {
                format!("Database configuration error: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => {
                format!("Unknown database error: {}", message)
            }
        };

        if let Some(context) = &self.context {
            write!(f, "{} ({})", message, context)
        } else {
            write!(f, "{}", message)
        }
    }
}

impl std::error::Error for DatabaseError {}

impl PartialEq for DatabaseError {
    fn eq(&self, other: &Self) -> bool {
        format!("{:?}", self.kind) == format!("{:?}", other.kind)
    }
}
