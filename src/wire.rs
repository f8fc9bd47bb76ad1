use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Local;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type, METADATA_USER};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::{process_socket, TlsAcceptor};
use tokio::net::TcpStream;

use crate::auth::RoombookAuthSource;
use crate::catalog::Directory;
use crate::engine::{Engine, EngineError, ErrorKind, Transition};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};

pub struct RoombookHandler {
    engine: Arc<Engine>,
    directory: Arc<dyn Directory>,
    query_parser: Arc<RoombookQueryParser>,
}

impl RoombookHandler {
    pub fn new(engine: Arc<Engine>, directory: Arc<dyn Directory>) -> Self {
        Self {
            engine,
            directory,
            query_parser: Arc::new(RoombookQueryParser),
        }
    }

    /// The login user of the connection is the acting identity.
    fn resolve_actor<C: ClientInfo>(&self, client: &C) -> PgWireResult<Actor> {
        let login = client
            .metadata()
            .get(METADATA_USER)
            .cloned()
            .unwrap_or_default();
        self.directory
            .actor(&login)
            .ok_or_else(|| user_error("28000", format!("unknown user: {login}")))
    }

    async fn run(&self, actor: &Actor, cmd: Command, format: &Format) -> PgWireResult<Response> {
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(actor, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, actor: &Actor, cmd: Command, format: &Format) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertReservation {
                id,
                resource_id,
                slot_id,
                date,
                purpose,
                participants,
            } => {
                let request = ReservationRequest {
                    id,
                    resource_id,
                    slot_id,
                    date,
                    purpose,
                    participants,
                };
                engine.create_reservation(actor, request).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::CancelReservation { id } => {
                engine.cancel_reservation(actor, id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::Approve { reservation_id, notes } => {
                engine
                    .approve_reservation(actor, reservation_id, notes)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::Reject { reservation_id, notes } => {
                engine
                    .reject_reservation(actor, reservation_id, notes)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::Complete { reservation_id } => {
                if !actor.is_admin() {
                    return Err(engine_err(EngineError::PermissionDenied {
                        actor: actor.id.clone(),
                        transition: Transition::Complete,
                    }));
                }
                engine
                    .complete_reservation(reservation_id, Local::now().naive_local())
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::SelectReservations { filter } => {
                let reservations = engine.list_reservations(actor, &filter).await;
                let schema = Arc::new(reservations_schema(format));
                let rows: Vec<PgWireResult<_>> = reservations
                    .iter()
                    .map(|r| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&r.id.to_string())?;
                        encoder.encode_field(&r.requester)?;
                        encoder.encode_field(&r.resource_id.to_string())?;
                        encoder.encode_field(&r.slot_id.to_string())?;
                        encoder.encode_field(&r.date.to_string())?;
                        encoder.encode_field(&r.purpose)?;
                        encoder.encode_field(&i64::from(r.participants))?;
                        encoder.encode_field(&r.status.to_string())?;
                        encoder.encode_field(&r.created_at.to_rfc3339())?;
                        encoder.encode_field(&r.updated_at.to_rfc3339())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectEvents { reservation_id } => {
                let history = engine.history(actor, reservation_id).await.map_err(engine_err)?;
                let schema = Arc::new(events_schema(format));
                let rows: Vec<PgWireResult<_>> = history
                    .iter()
                    .map(|e| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&e.id.to_string())?;
                        encoder.encode_field(&e.reservation_id.to_string())?;
                        encoder.encode_field(&e.action.to_string())?;
                        encoder.encode_field(&e.actor)?;
                        encoder.encode_field(&e.notes)?;
                        encoder.encode_field(&e.created_at.to_rfc3339())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectAvailableSlots { resource_id, date } => {
                let slots = engine
                    .available_slots(resource_id, date)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(slots_schema(format));
                let rows: Vec<PgWireResult<_>> = slots
                    .iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.id.to_string())?;
                        encoder.encode_field(&s.name)?;
                        encoder.encode_field(&s.start.format("%H:%M").to_string())?;
                        encoder.encode_field(&s.end.format("%H:%M").to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectStats => {
                let counts = engine.status_counts(actor).await;
                let schema = Arc::new(stats_schema(format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                for n in [
                    counts.total,
                    counts.pending,
                    counts.confirmed,
                    counts.cancelled,
                    counts.completed,
                ] {
                    encoder.encode_field(&(n as i64))?;
                }
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

// ── Result schemas ───────────────────────────────────────────────

fn fields(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i)))
        .collect()
}

fn reservations_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("requester", Type::VARCHAR),
            ("resource_id", Type::VARCHAR),
            ("slot_id", Type::VARCHAR),
            ("date", Type::VARCHAR),
            ("purpose", Type::VARCHAR),
            ("participants", Type::INT8),
            ("status", Type::VARCHAR),
            ("created_at", Type::VARCHAR),
            ("updated_at", Type::VARCHAR),
        ],
        format,
    )
}

fn events_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("id", Type::VARCHAR),
            ("reservation_id", Type::VARCHAR),
            ("action", Type::VARCHAR),
            ("actor", Type::VARCHAR),
            ("notes", Type::VARCHAR),
            ("created_at", Type::VARCHAR),
        ],
        format,
    )
}

fn slots_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("slot_id", Type::VARCHAR),
            ("name", Type::VARCHAR),
            ("start", Type::VARCHAR),
            ("end", Type::VARCHAR),
        ],
        format,
    )
}

fn stats_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        &[
            ("total", Type::INT8),
            ("pending", Type::INT8),
            ("confirmed", Type::INT8),
            ("cancelled", Type::INT8),
            ("completed", Type::INT8),
        ],
        format,
    )
}

/// Row description for a statement, picked from its text before it runs.
fn result_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.trim_start().starts_with("SELECT") {
        return vec![];
    }
    if upper.contains("RESERVATION_EVENTS") {
        events_schema(format)
    } else if upper.contains("RESERVATION_STATS") {
        stats_schema(format)
    } else if upper.contains("AVAILABLE_SLOTS") {
        slots_schema(format)
    } else if upper.contains("RESERVATIONS") {
        reservations_schema(format)
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for RoombookHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let actor = self.resolve_actor(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        Ok(vec![self.run(&actor, cmd, &Format::UnifiedText).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RoombookQueryParser;

#[async_trait]
impl QueryParser for RoombookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt, column_format.unwrap_or(&Format::UnifiedText)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for RoombookHandler {
    type Statement = String;
    type QueryParser = RoombookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let actor = self.resolve_actor(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.run(&actor, cmd, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

fn quote_param(param: Option<&[u8]>) -> String {
    match param {
        Some(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            format!("'{}'", text.replace('\'', "''"))
        }
        None => "NULL".to_string(),
    }
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<&[u8]>> = portal.parameters.iter().map(|p| p.as_deref()).collect();
    splice_params(&portal.statement.statement, &params)
}

/// One left-to-right pass over the statement text. Spliced values are never
/// rescanned, and `$n` inside a quoted literal of the statement is left alone.
fn splice_params(sql: &str, params: &[Option<&[u8]>]) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut in_literal = false;
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let param = sql[start..end]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|idx| params.get(idx));
                if let Some(param) = param {
                    out.push_str(&sql[copied..i]);
                    out.push_str(&quote_param(*param));
                    copied = end;
                }
                i = end.max(i + 1);
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct RoombookFactory {
    handler: Arc<RoombookHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<RoombookAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl RoombookFactory {
    pub fn new(engine: Arc<Engine>, directory: Arc<dyn Directory>, password: String) -> Self {
        let auth_source = RoombookAuthSource::new(password, directory.clone());
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(RoombookHandler::new(engine, directory)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RoombookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    directory: Arc<dyn Directory>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(RoombookFactory::new(engine, directory, password));
    process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::PastDate => "22008",
        ErrorKind::InvalidRange => "22023",
        ErrorKind::CapacityExceeded => "23514",
        ErrorKind::InvalidParticipants => "22003",
        ErrorKind::LimitExceeded => "54000",
        ErrorKind::Conflict => "23P01",
        ErrorKind::AlreadyExists => "23505",
        ErrorKind::NotFound => "P0002",
        ErrorKind::PermissionDenied => "42501",
        ErrorKind::InvalidTransition => "55000",
        ErrorKind::Persistence => "58030",
    }
}

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(e.kind()), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
