//! Command execution: wires config, session, cache, and client together and
//! runs one subcommand per invocation.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::api::keys::{entity_key, list_family_pattern};
use crate::api::types::{
  InventoryItem, KitchenTicket, OrderSummary, Product, PurchaseOrder, StockLevel, VarianceReason,
};
use crate::api::ApiClient;
use crate::cache::{CacheService, CacheStore, NoopStore, SqliteStore};
use crate::config::Config;
use crate::list::{EndpointFetcher, ListController, ListParams};
use crate::session::SessionStore;
use crate::workflow::{BarcodeScanner, CountingSheet, ReceivingSheet, ScanOutcome};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Log in and store the session
  Login {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },
  /// Select the business/branch sent with every request
  Use {
    #[arg(long)]
    business: Option<String>,
    #[arg(long)]
    branch: Option<String>,
  },
  /// Forget the stored session
  Logout,
  /// List orders
  Orders {
    #[arg(long)]
    status: Option<String>,
    /// Walk every page instead of just the first
    #[arg(long)]
    all: bool,
    /// Bypass the cache
    #[arg(long)]
    refresh: bool,
  },
  /// List store products
  Products {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    all: bool,
    #[arg(long)]
    refresh: bool,
  },
  /// List inventory items
  Items {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    all: bool,
  },
  /// Show stock levels for the selected branch
  Stock {
    #[arg(long)]
    all: bool,
  },
  /// Show open kitchen tickets
  Kitchen {
    #[arg(long)]
    station: Option<String>,
  },
  /// Cancel an order
  CancelOrder {
    id: String,
    /// Confirm the cancellation
    #[arg(long)]
    yes: bool,
  },
  /// Purchase-order workflow
  Po {
    #[command(subcommand)]
    command: PoCommand,
  },
  /// Cache maintenance
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },
}

#[derive(Subcommand, Debug)]
pub enum PoCommand {
  /// List purchase orders
  List {
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    all: bool,
  },
  /// Show one purchase order with its lines
  Show { id: String },
  /// Count a pending purchase order from a count sheet file
  Count {
    id: String,
    /// YAML file with counted quantities, scans, and variance reasons
    #[arg(long)]
    sheet: PathBuf,
    /// Associate unknown scanned codes with their line's item
    #[arg(long)]
    register_unknown: bool,
  },
  /// Receive a counted purchase order against an invoice
  Receive {
    id: String,
    /// Reference to the captured invoice image
    #[arg(long)]
    invoice: String,
    /// YAML file with total cost per line
    #[arg(long)]
    costs: PathBuf,
  },
  /// Cancel a purchase order
  Cancel {
    id: String,
    /// Confirm the cancellation
    #[arg(long)]
    yes: bool,
  },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Show cache statistics
  Stats,
  /// Drop every cached entry
  Clear,
}

pub struct App {
  config: Config,
  cache: Arc<CacheService>,
  client: ApiClient,
  session_store: SessionStore,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let session_store = SessionStore::open()?;
    let session = session_store.load();

    // A cache that cannot open is a missing optimization, not a failure
    let store: Arc<dyn CacheStore> = if config.cache.disabled {
      Arc::new(NoopStore)
    } else {
      match SqliteStore::open() {
        Ok(store) => Arc::new(store),
        Err(e) => {
          warn!("Cache store unavailable, running without persistence: {}", e);
          Arc::new(NoopStore)
        }
      }
    };
    let cache = Arc::new(CacheService::new(store));
    cache.warm_up();

    let mut client =
      ApiClient::new(&config.api.url)?.with_session_store(session_store.clone());
    if let Some(session) = &session {
      client = client.with_session(session);
    } else if let Some(token) = Config::env_token() {
      client = client.with_token(token);
    }

    Ok(Self {
      config,
      cache,
      client,
      session_store,
    })
  }

  pub async fn run(self, command: Command) -> Result<()> {
    match command {
      Command::Login { email, password } => self.login(&email, &password).await,
      Command::Use { business, branch } => self.select_scope(business, branch),
      Command::Logout => {
        self.session_store.clear()?;
        println!("Logged out.");
        Ok(())
      }

      Command::Orders {
        status,
        all,
        refresh,
      } => {
        let mut params = ListParams::new();
        if let Some(status) = status {
          params.insert("status".into(), status);
        }
        self
          .run_list::<OrderSummary>("orders", params, all, refresh, |o| {
            format!(
              "{:<12} {:<10} {:>8.2}  {}",
              o.number,
              o.status,
              o.total,
              o.customer.as_deref().unwrap_or("-")
            )
          })
          .await
      }

      Command::Products {
        search,
        all,
        refresh,
      } => {
        let mut params = ListParams::new();
        if let Some(search) = search {
          params.insert("search".into(), search);
        }
        self
          .run_list::<Product>("store-products", params, all, refresh, |p| {
            format!(
              "{:<28} {:<14} {:>8.2}  {}",
              p.name,
              p.sku.as_deref().unwrap_or("-"),
              p.price,
              if p.active { "active" } else { "inactive" }
            )
          })
          .await
      }

      Command::Items { search, all } => {
        let mut params = ListParams::new();
        if let Some(search) = search {
          params.insert("search".into(), search);
        }
        self
          .run_list::<InventoryItem>("inventory/items", params, all, false, |i| {
            format!(
              "{:<28} {:<8} {}",
              i.name,
              i.unit,
              i.barcode.as_deref().unwrap_or("-")
            )
          })
          .await
      }

      Command::Stock { all } => {
        self
          .run_list::<StockLevel>("inventory-stock/levels", ListParams::new(), all, false, |s| {
            let reorder = s
              .reorder_level
              .map(|r| format!(" (reorder at {})", r))
              .unwrap_or_default();
            format!("{:<28} {:>10.2} {}{}", s.name, s.quantity, s.unit, reorder)
          })
          .await
      }

      Command::Kitchen { station } => {
        let mut params = ListParams::new();
        if let Some(station) = station {
          params.insert("station".into(), station);
        }
        self
          .run_list::<KitchenTicket>("pos/kitchen/tickets", params, false, true, |t| {
            format!(
              "{:<10} {:<10} {:<8} {}",
              t.order_number,
              t.status,
              t.station.as_deref().unwrap_or("-"),
              t.items.join(", ")
            )
          })
          .await
      }

      Command::CancelOrder { id, yes } => {
        confirm(yes, &format!("cancel order {}", id))?;
        self.client.cancel_order(&id).await?;
        self.cache.invalidate_pattern(&list_family_pattern("orders"));
        println!("Order {} cancelled.", id);
        Ok(())
      }

      Command::Po { command } => self.run_po(command).await,

      Command::Cache { command } => match command {
        CacheCommand::Stats => {
          println!("{} entries in the cache mirror", self.cache.len());
          Ok(())
        }
        CacheCommand::Clear => {
          self.cache.clear();
          println!("Cache cleared.");
          Ok(())
        }
      },
    }
  }

  async fn run_po(self, command: PoCommand) -> Result<()> {
    match command {
      PoCommand::List { status, all } => {
        let mut params = ListParams::new();
        if let Some(status) = status {
          params.insert("status".into(), status);
        }
        self
          .run_list::<PurchaseOrder>("purchase-orders", params, all, false, |po| {
            format!("{:<12} {:<10} {:?}", po.number, po.supplier, po.status)
          })
          .await
      }

      PoCommand::Show { id } => {
        // Detail views tolerate a short TTL; a workflow step always
        // re-fetches the order itself
        let po = self
          .cache
          .get_or_fetch(
            &entity_key("po", &id),
            Duration::from_secs(30),
            false,
            || async { Ok(self.client.get_purchase_order(&id).await?) },
          )
          .await?;
        println!("{} from {} - {:?}", po.number, po.supplier, po.status);
        for line in &po.lines {
          let counted = line
            .counted_qty
            .map(|q| format!("{}", q))
            .unwrap_or_else(|| "-".into());
          let received = line
            .received_qty
            .map(|q| format!("{}", q))
            .unwrap_or_else(|| "-".into());
          println!(
            "  {:<28} ordered {:>7} counted {:>7} received {:>7}",
            line.name, line.ordered_qty, counted, received
          );
        }
        Ok(())
      }

      PoCommand::Count {
        id,
        sheet,
        register_unknown,
      } => self.count_po(&id, &sheet, register_unknown).await,

      PoCommand::Receive { id, invoice, costs } => self.receive_po(&id, invoice, &costs).await,

      PoCommand::Cancel { id, yes } => {
        confirm(yes, &format!("cancel purchase order {}", id))?;
        let po = self.client.cancel_purchase_order(&id).await?;
        self.invalidate_po(&id);
        println!("Purchase order {} is now {:?}.", po.number, po.status);
        Ok(())
      }
    }
  }

  async fn count_po(&self, id: &str, sheet_path: &Path, register_unknown: bool) -> Result<()> {
    let file: CountFile = read_yaml(sheet_path)?;

    let po = self.client.get_purchase_order(id).await?;
    let mut sheet = CountingSheet::from_order(&po)?;
    let scanner = BarcodeScanner::new(self.client.clone());

    for entry in file.lines {
      sheet.record_count(&entry.item, entry.counted)?;
      if let Some(reason) = entry.reason {
        sheet.set_variance_reason(&entry.item, reason)?;
      }
      if let Some(note) = entry.note {
        sheet.set_note(&entry.item, note)?;
      }

      let Some(code) = entry.scan else {
        continue;
      };
      match scanner.resolve(&code, &entry.item).await? {
        ScanOutcome::Matched => sheet.mark_scanned(&entry.item)?,
        ScanOutcome::WrongItem { name, .. } => {
          return Err(eyre!(
            "Scanned code {} belongs to {}, not this item. Re-scan the right product.",
            code,
            name
          ));
        }
        ScanOutcome::Unknown => {
          if register_unknown {
            scanner.register(&entry.item, &code).await?;
            sheet.mark_scanned(&entry.item)?;
          } else {
            return Err(eyre!(
              "Code {} is not in the barcode registry. Pass --register-unknown to associate it.",
              code
            ));
          }
        }
      }
    }

    let updated = sheet.submit(&self.client).await?;
    self.invalidate_po(id);
    println!("Purchase order {} is now {:?}.", updated.number, updated.status);
    Ok(())
  }

  async fn receive_po(&self, id: &str, invoice: String, costs_path: &Path) -> Result<()> {
    let file: CostFile = read_yaml(costs_path)?;

    let po = self.client.get_purchase_order(id).await?;
    let mut sheet = ReceivingSheet::from_order(&po)?;
    sheet.attach_invoice(invoice);
    for entry in file.lines {
      sheet.set_total_cost(&entry.item, entry.total_cost)?;
    }

    for line in sheet.lines() {
      if let Some(unit) = line.unit_cost_preview() {
        println!("  {:<28} ~{:.2}/unit (server computes final)", line.name, unit);
      }
    }

    let updated = sheet.submit(&self.client).await?;
    self.invalidate_po(id);
    println!("Purchase order {} is now {:?}.", updated.number, updated.status);
    Ok(())
  }

  /// A committed transition outdates both the cached detail and every
  /// cached list page.
  fn invalidate_po(&self, id: &str) {
    self.cache.invalidate(&entity_key("po", id));
    self
      .cache
      .invalidate_pattern(&list_family_pattern("purchase-orders"));
  }

  async fn login(&self, email: &str, password: &str) -> Result<()> {
    let mut session = self.client.login(email, password).await?;
    session.business_id = self.config.default_business.clone();
    session.branch_id = self.config.default_branch.clone();
    self.session_store.save(&session)?;

    println!("Logged in as {}.", session.user.name);
    if let Some(business) = &session.business_id {
      println!("Using business {}.", business);
    }
    Ok(())
  }

  fn select_scope(&self, business: Option<String>, branch: Option<String>) -> Result<()> {
    let mut session = self
      .session_store
      .load()
      .ok_or_else(|| eyre!("Not logged in. Run `boh login` first."))?;

    if let Some(business) = business {
      session.business_id = Some(business);
    }
    if let Some(branch) = branch {
      session.branch_id = Some(branch);
    }
    self.session_store.save(&session)?;

    println!(
      "Using business {} branch {}.",
      session.business_id.as_deref().unwrap_or("-"),
      session.branch_id.as_deref().unwrap_or("-")
    );
    Ok(())
  }

  /// Drive one list endpoint through the paginated controller and print it.
  async fn run_list<T>(
    &self,
    endpoint: &str,
    params: ListParams,
    all: bool,
    refresh: bool,
    render: impl Fn(&T) -> String,
  ) -> Result<()>
  where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
  {
    let fetcher = Arc::new(EndpointFetcher::<T>::new(self.client.clone(), endpoint));
    let mut list: ListController<T> = ListController::new(endpoint, Arc::clone(&self.cache), fetcher)
      .with_page_size(self.config.lists.page_size)
      .with_ttl(Duration::from_secs(self.config.cache.ttl_seconds))
      .with_params(params);

    list.load_initial(refresh).await;
    if let Some(error) = list.error() {
      return Err(eyre!("{}", error));
    }

    if all {
      while list.state().has_more {
        list.load_more().await;
        if let Some(error) = list.error() {
          return Err(eyre!("{}", error));
        }
      }
    }

    for item in list.items() {
      println!("{}", render(item));
    }
    let suffix = if list.state().has_more {
      " (more available)"
    } else {
      ""
    };
    println!("{} of {}{}", list.items().len(), list.state().total, suffix);

    // Give a pending revalidation a chance to land so the freshest data is
    // what gets shown; an unchanged result prints nothing new.
    if list.poll_wait().await {
      println!("-- updated --");
      for item in list.items() {
        println!("{}", render(item));
      }
    }

    Ok(())
  }
}

fn confirm(yes: bool, action: &str) -> Result<()> {
  if yes {
    Ok(())
  } else {
    Err(eyre!(
      "Refusing to {} without confirmation. Re-run with --yes.",
      action
    ))
  }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;
  serde_yaml::from_str(&contents).map_err(|e| eyre!("Failed to parse {}: {}", path.display(), e))
}

/// Count sheet file: one entry per purchase-order line.
#[derive(Debug, Deserialize)]
struct CountFile {
  lines: Vec<CountFileLine>,
}

#[derive(Debug, Deserialize)]
struct CountFileLine {
  item: String,
  counted: f64,
  /// Barcode scanned to confirm the item
  scan: Option<String>,
  /// Required when counted < ordered
  reason: Option<VarianceReason>,
  /// Required when counted > ordered
  note: Option<String>,
}

/// Cost file for receiving: total cost per line.
#[derive(Debug, Deserialize)]
struct CostFile {
  lines: Vec<CostFileLine>,
}

#[derive(Debug, Deserialize)]
struct CostFileLine {
  item: String,
  total_cost: f64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confirm_requires_yes() {
    assert!(confirm(false, "cancel order 7").is_err());
    assert!(confirm(true, "cancel order 7").is_ok());
  }

  #[test]
  fn count_file_parses() {
    let yaml = r#"
lines:
  - item: tomato
    counted: 9
    scan: "0123"
    reason: missing
    note: "two crates crushed"
  - item: basil
    counted: 5
"#;
    let file: CountFile = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(file.lines.len(), 2);
    assert_eq!(file.lines[0].reason, Some(VarianceReason::Missing));
    assert!(file.lines[1].scan.is_none());
  }

  #[test]
  fn cost_file_parses() {
    let yaml = "lines:\n  - item: tomato\n    total_cost: 12.5\n";
    let file: CostFile = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(file.lines[0].total_cost, 12.5);
  }
}
