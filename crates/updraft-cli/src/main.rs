use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use updraft_core::{
    ConnectionConfig, Orchestrator, OrchestratorConfig, PartitionStatus, PgConnector, RunOutcome,
    WarehouseAssignment, WarehouseConnector, WarehouseSession,
};

#[derive(Parser)]
#[command(name = "updraft")]
#[command(about = "Partitioned parallel updates for SQL warehouses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Debug)]
struct ConnectionArgs {
    /// Warehouse host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Warehouse port
    #[arg(long, default_value_t = 5432)]
    port: u16,

    /// User name
    #[arg(short, long)]
    user: String,

    /// Password (falls back to UPDRAFT_PASSWORD)
    #[arg(long, env = "UPDRAFT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database name
    #[arg(short, long)]
    database: String,

    /// Default schema
    #[arg(long)]
    schema: Option<String>,

    /// Default warehouse / workload group
    #[arg(short, long)]
    warehouse: Option<String>,
}

impl ConnectionArgs {
    fn to_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(&self.host, &self.user, &self.database)
            .with_port(self.port);
        if let Some(password) = &self.password {
            config = config.with_password(password);
        }
        if let Some(schema) = &self.schema {
            config = config.with_schema(schema);
        }
        if let Some(warehouse) = &self.warehouse {
            config = config.with_warehouse(warehouse);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mutation statement across hash partitions in parallel
    Update {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Target table (must appear verbatim in the statement)
        #[arg(short, long)]
        table: String,

        /// Row-key column, in key order (repeat for composite keys)
        #[arg(short, long = "key-column", required = true)]
        key_columns: Vec<String>,

        /// Number of partitions
        #[arg(short = 'n', long, default_value_t = 4)]
        partitions: u32,

        /// Per-partition warehouse override (repeat once per partition)
        #[arg(long = "partition-warehouse")]
        partition_warehouses: Vec<String>,

        /// Mutate the table in place instead of going through workspaces
        #[arg(long)]
        in_place: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,

        /// The UPDATE statement to run
        statement: String,
    },

    /// One-shot column backfill on a single session
    Backfill {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Target table
        #[arg(short, long)]
        table: String,

        /// Column to backfill
        #[arg(short, long)]
        column: String,

        /// SQL expression for the new value
        #[arg(short, long)]
        expression: String,

        /// Optional row filter (SQL predicate)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Query an audit/access-log table for GET/PUT events
    AuditLog {
        #[command(flatten)]
        conn: ConnectionArgs,

        /// Audit log table
        #[arg(short, long, default_value = "access_log")]
        table: String,

        /// Substring to match in the request parameters
        #[arg(short, long)]
        request_param: String,

        /// Maximum rows to print
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Update {
            conn,
            table,
            key_columns,
            partitions,
            partition_warehouses,
            in_place,
            json,
            statement,
        } => {
            run_update(
                conn,
                table,
                key_columns,
                partitions,
                partition_warehouses,
                in_place,
                json,
                statement,
            )
            .await
        }
        Commands::Backfill {
            conn,
            table,
            column,
            expression,
            filter,
        } => run_backfill(conn, table, column, expression, filter).await,
        Commands::AuditLog {
            conn,
            table,
            request_param,
            limit,
        } => run_audit_log(conn, table, request_param, limit).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_update(
    conn: ConnectionArgs,
    table: String,
    key_columns: Vec<String>,
    partitions: u32,
    partition_warehouses: Vec<String>,
    in_place: bool,
    json: bool,
    statement: String,
) -> Result<()> {
    let warehouses = if partition_warehouses.is_empty() {
        WarehouseAssignment::Inherit
    } else {
        WarehouseAssignment::PerPartition(partition_warehouses)
    };
    let config = OrchestratorConfig::new(key_columns)
        .with_num_partitions(partitions)
        .with_warehouses(warehouses);
    let connector = Arc::new(PgConnector::new(conn.to_config()));
    let orchestrator = Orchestrator::new(connector, config);

    let outcome = if in_place {
        orchestrator.parallel_update_in_place(&table, &statement).await?
    } else {
        orchestrator.parallel_update(&table, &statement).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    if !outcome.is_success() {
        return Err(anyhow!("parallel update failed (run {})", outcome.run_id));
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    println!("Run {}: {:?}", outcome.run_id, outcome.status);
    for partition in &outcome.partitions {
        let target = partition
            .warehouse
            .as_deref()
            .unwrap_or("default warehouse");
        match &partition.status {
            PartitionStatus::Success { rows_affected } => {
                println!(
                    "  partition {} ({target}): {rows_affected} rows updated",
                    partition.partition
                );
            }
            PartitionStatus::Error { detail } => {
                println!("  partition {} ({target}): FAILED: {detail}", partition.partition);
            }
        }
    }
    if let Some(merge) = &outcome.merge {
        println!(
            "  merged {} rows back into the source ({} columns)",
            merge.rows_merged,
            merge.columns.len()
        );
    }
    if let Some(failure) = &outcome.failure {
        println!("  failure: {failure:?}");
    }
    println!("Total rows updated: {}", outcome.rows_affected());
}

async fn run_backfill(
    conn: ConnectionArgs,
    table: String,
    column: String,
    expression: String,
    filter: Option<String>,
) -> Result<()> {
    let statement = match &filter {
        Some(predicate) => {
            format!("UPDATE {table} SET {column} = {expression} WHERE {predicate}")
        }
        None => format!("UPDATE {table} SET {column} = {expression}"),
    };

    let connector = PgConnector::new(conn.to_config());
    let mut session = connector.connect(None).await?;
    let rows = session.execute(&statement).await?;
    session.close().await?;

    println!("{rows} rows backfilled on {table}.{column}");
    Ok(())
}

async fn run_audit_log(
    conn: ConnectionArgs,
    table: String,
    request_param: String,
    limit: i64,
) -> Result<()> {
    let config = conn.to_config();
    let mut pg = tokio_postgres::Config::new();
    pg.host(&config.host)
        .port(config.port)
        .user(&config.user)
        .dbname(&config.database);
    if let Some(password) = &config.password {
        pg.password(password);
    }
    let (client, connection) = pg.connect(tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "audit-log connection closed with error");
        }
    });

    let statement = format!(
        "SELECT event_time::text, event_name, source_ip::text, user_agent, \
         request_params, error_code \
         FROM {table} \
         WHERE event_name IN ('GetObject', 'PutObject') \
         AND request_params LIKE $1 \
         ORDER BY event_time DESC LIMIT {limit}"
    );
    let pattern = format!("%{request_param}%");
    let rows = client.query(&statement, &[&pattern]).await?;

    if rows.is_empty() {
        println!("No matching events");
        return Ok(());
    }
    for row in &rows {
        let event_time: String = row.get(0);
        let event_name: String = row.get(1);
        let source_ip: Option<String> = row.get(2);
        let user_agent: Option<String> = row.get(3);
        let request_params: Option<String> = row.get(4);
        let error_code: Option<String> = row.get(5);
        println!(
            "{event_time}  {event_name}  {}  {}  {}{}",
            source_ip.as_deref().unwrap_or("-"),
            user_agent.as_deref().unwrap_or("-"),
            request_params.as_deref().unwrap_or("-"),
            match error_code {
                Some(code) => format!("  [error: {code}]"),
                None => String::new(),
            }
        );
    }
    println!("{} events", rows.len());
    Ok(())
}
