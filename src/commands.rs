//! Command line host: each subcommand delivers events to the worker.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::sync::Arc;

use crate::cache::{GenerationStorage, SqliteStorage};
use crate::event::{Completion, Event, EventHandler};
use crate::form::FormFields;
use crate::host::SqliteRegistrar;
use crate::http::{Request, Response};
use crate::worker::{Settings, Worker};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Precache the shell resources of the configured version
  Install,
  /// Make the configured version live and delete every other generation
  Activate,
  /// Send a request through the worker and print the response
  Fetch {
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Form field, sent as multipart/form-data (repeatable)
    #[arg(short = 'F', long = "form", value_name = "KEY=VALUE")]
    form: Vec<String>,
    /// Absolute URL or path relative to the origin
    url: String,
  },
  /// Deliver connectivity triggers and replay queued submissions
  Sync {
    /// Trigger channel (default: pending registrations, else the configured tag)
    #[arg(long)]
    tag: Option<String>,
  },
  /// List queued submissions
  Outbox,
  /// List stored cache generations
  Generations,
}

/// Everything a subcommand needs.
pub struct Context {
  pub settings: Settings,
  pub events: EventHandler,
  pub worker: Arc<Worker<SqliteStorage>>,
  pub registrar: SqliteRegistrar,
}

pub async fn run(command: Command, ctx: &Context) -> Result<()> {
  match command {
    Command::Install => {
      ctx.events.dispatch(Event::Install).await?;
      println!("installed {}", ctx.settings.version);
    }
    Command::Activate => {
      ctx.events.dispatch(Event::Activate).await?;
      println!("activated {}", ctx.settings.version);
    }
    Command::Fetch { method, form, url } => {
      let request = build_request(&ctx.settings, &method, &form, &url)?;
      if let Completion::Responded(response) = ctx.events.dispatch(Event::Fetch(request)).await? {
        print_response(&response);
      }
    }
    Command::Sync { tag } => sync(ctx, tag).await?,
    Command::Outbox => {
      for entry in ctx.worker.outbox().list_ordered().await? {
        let fields: Vec<String> = entry
          .payload
          .iter()
          .map(|(k, v)| format!("{}={}", k, v))
          .collect();
        println!(
          "{}\t{}\t{}\t{}",
          entry.id,
          entry.created_at.to_rfc3339(),
          entry.target_path,
          fields.join("&")
        );
      }
    }
    Command::Generations => {
      for generation in ctx.worker.generations().generations()? {
        println!(
          "{}\t{}\t{} entries\t{}",
          generation.tag,
          generation.state.as_str(),
          generation.entries,
          generation.created_at.to_rfc3339()
        );
      }
    }
  }

  Ok(())
}

async fn sync(ctx: &Context, tag: Option<String>) -> Result<()> {
  let tags = match tag {
    Some(tag) => vec![tag],
    None => {
      let pending = ctx.registrar.pending().await?;
      if pending.is_empty() {
        vec![ctx.settings.sync_tag.clone()]
      } else {
        pending
      }
    }
  };

  for tag in tags {
    match ctx
      .events
      .dispatch(Event::ConnectivityTrigger(tag.clone()))
      .await?
    {
      Completion::Replayed(report) => println!(
        "{}: {} attempted, {} delivered, {} still queued",
        tag, report.attempted, report.delivered, report.kept
      ),
      _ => println!("{}: not a replay channel", tag),
    }
    ctx.registrar.complete(&tag).await?;
  }

  Ok(())
}

fn build_request(settings: &Settings, method: &str, form: &[String], url: &str) -> Result<Request> {
  let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
    .map_err(|_| eyre!("Invalid HTTP method: {}", method))?;
  let url = settings
    .origin
    .join(url)
    .map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;

  let mut fields = FormFields::new();
  for pair in form {
    let (key, value) = pair
      .split_once('=')
      .ok_or_else(|| eyre!("Form field must be KEY=VALUE, got {}", pair))?;
    fields.set(key, value);
  }

  if fields.is_empty() {
    return Ok(Request::new(method, url));
  }

  let (content_type, body) = fields.to_multipart();
  let mut request = Request::post(url, &content_type, body);
  request.method = method;
  Ok(request)
}

fn print_response(response: &Response) {
  println!("{}", response.status);
  for (name, value) in &response.headers {
    println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
  }
  println!();
  println!("{}", String::from_utf8_lossy(&response.body));
}
