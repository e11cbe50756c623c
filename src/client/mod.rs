//! # Client CLI
//!
//! Interactive command-line client: authenticate against the orchestrator,
//! then submit tasks and query their status from a small menu. The client
//! keeps its own Lamport clock, ticking on every request and merging every
//! reply, so causal order spans the client-orchestrator boundary.

use std::io::Write as _;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::common::clock::LamportClock;
use crate::common::connection::Connection;
use crate::common::messages::{Credentials, Envelope, Payload};
use crate::common::task::Task;

/// Interactive client session.
pub struct ClientCli {
    orchestrator_addr: String,
    clock: LamportClock,
    token: Option<String>,
    username: Option<String>,
}

impl ClientCli {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            orchestrator_addr: format!("{}:{}", host, port),
            clock: LamportClock::new(),
            token: None,
            username: None,
        }
    }

    /// Connect, authenticate, and run the menu loop until the user quits.
    pub async fn run(&mut self) -> Result<()> {
        let stream = TcpStream::connect(&self.orchestrator_addr)
            .await
            .with_context(|| {
                format!("failed to reach the orchestrator at {}", self.orchestrator_addr)
            })?;
        let mut conn = Connection::new(stream);
        let mut input = BufReader::new(tokio::io::stdin()).lines();

        if !self.authenticate(&mut conn, &mut input).await? {
            println!("Authentication failed.");
            return Ok(());
        }
        println!(
            "Authentication succeeded! Welcome, {}.",
            self.username.as_deref().unwrap_or("?")
        );

        loop {
            println!("\nChoose an option:");
            println!("1. Submit a new task");
            println!("2. Query task status");
            println!("3. Quit");
            let choice = prompt(&mut input, "> ").await?;

            match choice.as_str() {
                "1" => self.submit_task(&mut conn, &mut input).await?,
                "2" => self.query_status(&mut conn, &mut input).await?,
                "3" => break,
                _ => println!("Invalid option."),
            }
        }

        Ok(())
    }

    async fn authenticate(
        &mut self,
        conn: &mut Connection,
        input: &mut Lines<BufReader<Stdin>>,
    ) -> Result<bool> {
        let username = prompt(input, "Username: ").await?;
        let password = prompt(input, "Password: ").await?;

        self.send(
            conn,
            Payload::Authenticate(Credentials {
                username: username.clone(),
                password,
            }),
        )
        .await?;

        match self.receive(conn).await?.payload {
            Payload::AuthOk { token } => {
                self.token = Some(token);
                self.username = Some(username);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn submit_task(
        &mut self,
        conn: &mut Connection,
        input: &mut Lines<BufReader<Stdin>>,
    ) -> Result<()> {
        let payload = prompt(input, "Describe the task payload (e.g. 'transcode video 4k'): ").await?;

        let suffix = Uuid::new_v4().simple().to_string();
        let task_id = format!("task-{}", &suffix[..8]);
        let client_id = self.username.clone().unwrap_or_default();
        let task = Task::new(task_id, client_id, payload);

        self.send(conn, Payload::SubmitTask(task)).await?;

        match self.receive(conn).await?.payload {
            Payload::TaskAccepted { task_id } => {
                println!("Task submitted successfully! Task id: {}", task_id);
            }
            _ => println!("Failed to submit the task."),
        }
        Ok(())
    }

    async fn query_status(
        &mut self,
        conn: &mut Connection,
        input: &mut Lines<BufReader<Stdin>>,
    ) -> Result<()> {
        let task_id = prompt(input, "Task id: ").await?;

        self.send(conn, Payload::QueryStatus { task_id }).await?;

        match self.receive(conn).await?.payload {
            Payload::StatusReply(Some(task)) => {
                println!("\n--- Task status ---");
                println!("Id:      {}", task.id);
                println!("Status:  {:?}", task.status);
                println!("Worker:  {}", task.worker_id.as_deref().unwrap_or("n/a"));
                println!("Lamport: {}", task.lamport);
                println!("-------------------");
            }
            Payload::StatusReply(None) => println!("Task not found."),
            _ => println!("Unexpected reply from the orchestrator."),
        }
        Ok(())
    }

    /// Send a request with the session token and a fresh clock tick.
    async fn send(&self, conn: &mut Connection, payload: Payload) -> Result<()> {
        let envelope = Envelope::new(payload)
            .with_token(self.token.clone())
            .with_lamport(self.clock.tick());
        conn.write_envelope(&envelope).await
    }

    /// Wait for a reply and merge its timestamp into the local clock.
    async fn receive(&self, conn: &mut Connection) -> Result<Envelope> {
        let Some(envelope) = conn.read_envelope().await? else {
            bail!("connection closed by the orchestrator");
        };
        if envelope.lamport > 0 {
            self.clock.merge(envelope.lamport);
        }
        Ok(envelope)
    }
}

async fn prompt(input: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let line = input.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}
