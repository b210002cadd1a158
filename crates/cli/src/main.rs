use anyhow::Context;
use clap::{Parser, Subcommand};
use lims_core::permissions::RolePermission;
use lims_core::{
    ActionKind, Actor, CoreConfig, EffectivePermission, InMemoryCatalog, InMemoryStore,
    LabService, MemoryRenderer, NewOrder, NewPatient, NonEmptyText, ResultEntry, ResultStatus,
    Role, SampleStatus, Sex, TestDefinitionInput, UserId, WorkflowSettings,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lims")]
#[command(about = "LIMS workflow and permission CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective permission matrix
    Permissions {
        /// JSON file holding a list of role override rows
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
    /// Check whether a role may perform an action
    Allowed {
        /// Role, e.g. TECHNOLOGIST
        role: String,
        /// Action, e.g. VERIFY_RESULT
        action: String,
        /// JSON file holding a list of role override rows
        #[arg(long)]
        overrides: Option<PathBuf>,
    },
    /// Run one order through the whole lab workflow against an in-memory store
    Demo {
        /// Lab name printed on the report
        #[arg(long, default_value = "Demo Lab")]
        lab_name: String,
        /// Samples are born collected
        #[arg(long)]
        skip_collection: bool,
        /// Collected samples are received in the same step
        #[arg(long)]
        skip_receive: bool,
        /// Entered results are verified in the same step
        #[arg(long)]
        skip_verification: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lims_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Permissions { overrides }) => {
            let service = service(default_config()?)?;
            apply_overrides(&service, overrides)?;
            print_matrix(&service.effective_permissions()?);
        }
        Some(Commands::Allowed {
            role,
            action,
            overrides,
        }) => {
            let role: Role = role.parse()?;
            let action: ActionKind = action.parse()?;
            let service = service(default_config()?)?;
            apply_overrides(&service, overrides)?;

            let allowed = service.is_allowed(&Actor::new(UserId(0), "cli", role)?, action)?;
            println!("{role} {} {action}", if allowed { "may" } else { "may not" });
        }
        Some(Commands::Demo {
            lab_name,
            skip_collection,
            skip_receive,
            skip_verification,
        }) => {
            let settings = WorkflowSettings {
                enable_sample_collection: !skip_collection,
                enable_sample_receive: !skip_receive,
                enable_verification: !skip_verification,
                updated_at: None,
            };
            let cfg = CoreConfig::new(NonEmptyText::new(&lab_name)?, settings);
            run_demo(cfg)?;
        }
        None => {
            println!("Use 'lims --help' for commands");
        }
    }

    Ok(())
}

fn default_config() -> anyhow::Result<CoreConfig> {
    Ok(CoreConfig::new(
        NonEmptyText::new("LIMS")?,
        WorkflowSettings::default(),
    ))
}

fn service(cfg: CoreConfig) -> anyhow::Result<LabService<InMemoryStore>> {
    let catalog = InMemoryCatalog::new()
        .with_test(test("CBC", "Complete Blood Count", "Blood", 500))?
        .with_test(test("LFT", "Liver Function Tests", "Serum", 1200))?;
    Ok(LabService::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(catalog),
        Arc::new(MemoryRenderer::new()),
        Arc::new(cfg),
    ))
}

fn test(code: &str, name: &str, sample_type: &str, price: i64) -> TestDefinitionInput {
    TestDefinitionInput {
        code: code.into(),
        name: name.into(),
        sample_type: sample_type.into(),
        price: Decimal::new(price, 0),
        turnaround_time_hours: 24,
        is_active: true,
    }
}

fn apply_overrides(
    service: &LabService<InMemoryStore>,
    overrides: Option<PathBuf>,
) -> anyhow::Result<()> {
    let Some(path) = overrides else {
        return Ok(());
    };
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let rows: Vec<RolePermission> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid override file {}", path.display()))?;

    let admin = Actor::new(UserId(0), "cli", Role::Admin)?;
    for row in rows {
        service.set_role_permission(&admin, row.role, row.capabilities)?;
    }
    Ok(())
}

fn print_matrix(rows: &[EffectivePermission]) {
    let flag = |b: bool| if b { "x" } else { "." };
    println!(
        "{:<13} {:>3} {:>3} {:>3} {:>3} {:>3} {:>3} {:>3} {:>3}  source",
        "role", "reg", "col", "rcv", "ent", "ver", "pub", "cat", "set"
    );
    for row in rows {
        let c = row.capabilities;
        println!(
            "{:<13} {:>3} {:>3} {:>3} {:>3} {:>3} {:>3} {:>3} {:>3}  {:?}",
            row.role.as_str(),
            flag(c.can_register),
            flag(c.can_collect),
            flag(c.can_receive),
            flag(c.can_enter_result),
            flag(c.can_verify),
            flag(c.can_publish),
            flag(c.can_edit_catalog),
            flag(c.can_edit_settings),
            row.source,
        );
    }
}

fn run_demo(cfg: CoreConfig) -> anyhow::Result<()> {
    let service = service(cfg)?;
    let reception = Actor::new(UserId(2), "reception", Role::Reception)?;
    let phlebotomist = Actor::new(UserId(3), "phlebotomy", Role::Phlebotomy)?;
    let technologist = Actor::new(UserId(4), "technologist", Role::Technologist)?;
    let pathologist = Actor::new(UserId(5), "pathologist", Role::Pathologist)?;

    let patient = service.register_patient(
        &reception,
        NewPatient {
            full_name: "Ayesha Khan".into(),
            father_name: "Imran Khan".into(),
            dob: chrono::NaiveDate::from_ymd_opt(1990, 4, 12).context("invalid date")?,
            sex: Sex::Female,
            phone: "03001234567".into(),
            cnic: "35202-1234567-1".into(),
            address: String::new(),
        },
    )?;
    println!("registered {} ({})", patient.full_name, patient.mrn);

    let tests = service
        .catalog()
        .tests()?
        .into_iter()
        .map(|t| t.id)
        .collect();
    let order = service.create_order(
        &reception,
        NewOrder {
            patient_id: patient.id,
            test_ids: tests,
            priority: Default::default(),
            notes: String::new(),
            discount: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
        },
    )?;
    println!(
        "order {} created: {} (net {})",
        order.order.order_no, order.status, order.net_amount
    );

    for item in &order.items {
        let mut sample = match &item.sample {
            Some(sample) => sample.clone(),
            None => service.create_sample(&phlebotomist, item.item.id)?,
        };
        if sample.status == SampleStatus::Pending {
            sample = service.collect_sample(&phlebotomist, sample.id)?;
        }
        if sample.status == SampleStatus::Collected {
            sample = service.receive_sample(&technologist, sample.id)?;
        }
        println!("  {} sample {}: {}", item.item.test_code, sample.barcode, sample.status);
    }
    let received = service.order_view(order.order.id)?;
    println!("order status: {}", received.status);

    for item in &received.items {
        let result = match &item.result {
            Some(result) => result.clone(),
            None => service.create_result(&technologist, item.item.id)?,
        };
        let mut result = service.enter_result(
            &technologist,
            result.id,
            ResultEntry::value("normal").with_unit("-"),
        )?;
        if result.status == ResultStatus::Entered {
            result = service.verify_result(&pathologist, result.id)?;
        }
        let result = service.publish_result(&pathologist, result.id)?;
        println!("  {} result: {}", item.item.test_code, result.status);
    }

    let view = service.order_view(order.order.id)?;
    println!("order status: {}", view.status);

    let outcome = service.generate_report(&pathologist, view.order.id)?;
    println!("report written to {}", outcome.report.artifact);
    Ok(())
}
