mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use aero_acl::{
    AclConfig, AclRoot, Principal, Privilege, PrivilegeName, ResourceAcl, Transaction,
};
use config::read_config;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(
        short,
        long,
        env = "AEROGRAMME_ACL_CONFIG",
        default_value = "aerogramme-acl.toml"
    )]
    /// Path to the ACL configuration file
    config_file: PathBuf,

    #[clap(long, env = "AEROGRAMME_ACL_ROOT")]
    /// Use this DAV root with default settings instead of reading the configuration file
    root: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Resource path, eg. /alice/calendar/meeting.ics
    #[clap(short, long)]
    path: String,

    /// Principal on behalf of whom the command runs
    #[clap(long = "as", env = "AEROGRAMME_ACL_PRINCIPAL")]
    acting: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the supported privileges
    Privileges,
    /// Display the ACL of a resource
    Show {
        #[clap(flatten)]
        target: Target,
    },
    /// Check if a principal holds a privilege, exits with 1 when it does not
    Check {
        #[clap(flatten)]
        target: Target,
        privilege: String,
        /// Principal to check, the acting principal by default
        #[clap(long)]
        principal: Option<String>,
    },
    /// Grant privileges to a principal
    Grant {
        #[clap(flatten)]
        target: Target,
        #[clap(long)]
        principal: String,
        #[clap(required = true)]
        privileges: Vec<String>,
    },
    /// Deny privileges to a principal
    Deny {
        #[clap(flatten)]
        target: Target,
        #[clap(long)]
        principal: String,
        #[clap(required = true)]
        privileges: Vec<String>,
    },
    /// Forget grants and denials of a principal, all of them if none is given
    Revoke {
        #[clap(flatten)]
        target: Target,
        #[clap(long)]
        principal: String,
        privileges: Vec<String>,
    },
    /// Delete the ACL of a resource
    Remove {
        #[clap(flatten)]
        target: Target,
    },
}

fn tracer() {
    tracing_subscriber::fmt::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,aero_acl=info,aero_store=info")
    }

    // Abort on panic, a half-written ACL must not be silently ignored
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracer();

    let args = Args::parse();
    let config = match args.root {
        Some(root) => AclConfig::new(root),
        None => read_config(args.config_file).context("read ACL configuration")?,
    };
    let root = AclRoot::on_disk(config);

    match args.command {
        Command::Privileges => {
            for (name, desc) in aero_acl::supported_privileges().iter() {
                println!("{:<34}{}", name, desc);
            }
        }
        Command::Show { target } => {
            let acl = open(&root, &target).await?;
            show(&acl);
        }
        Command::Check {
            target,
            privilege,
            principal,
        } => {
            let acl = open(&root, &target).await?;
            let who = Principal::new(principal.unwrap_or(target.acting));
            match acl.privilege_collection().authorize(&who, &privilege) {
                Ok(()) => println!("granted"),
                Err(e) if e.is_access_denied() => {
                    println!("denied");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Grant {
            target,
            principal,
            privileges,
        } => {
            edit(&root, &target, principal, &privileges, |p, n| {
                p.grant(n);
            })
            .await?
        }
        Command::Deny {
            target,
            principal,
            privileges,
        } => {
            edit(&root, &target, principal, &privileges, |p, n| {
                p.deny(n);
            })
            .await?
        }
        Command::Revoke {
            target,
            principal,
            privileges,
        } if privileges.is_empty() => {
            let mut acl = open(&root, &target).await?;
            let tx = Transaction::new(target.acting.as_str());
            acl.edit_privilege(&tx, Privilege::new(Principal::new(principal)))
                .await
                .context("revoke all privileges")?;
            show(&acl);
        }
        Command::Revoke {
            target,
            principal,
            privileges,
        } => {
            edit(&root, &target, principal, &privileges, |p, n| {
                p.revoke(n);
            })
            .await?
        }
        Command::Remove { target } => {
            let mut acl = open(&root, &target).await?;
            acl.remove_collection(&Transaction::new(target.acting.as_str()))
                .await
                .context("remove ACL")?;
            println!("ACL of {} removed", acl.resource());
        }
    }

    Ok(())
}

async fn open(root: &Arc<AclRoot>, target: &Target) -> Result<ResourceAcl> {
    root.open(&target.path, &Principal::new(target.acting.as_str()))
        .await
        .with_context(|| format!("open ACL of {}", target.path))
}

fn parse_privileges(raw: &[String]) -> Result<Vec<PrivilegeName>> {
    raw.iter()
        .map(|p| p.parse::<PrivilegeName>().map_err(|e| anyhow!(e)))
        .collect()
}

async fn edit(
    root: &Arc<AclRoot>,
    target: &Target,
    principal: String,
    privileges: &[String],
    change: impl Fn(&mut Privilege, PrivilegeName),
) -> Result<()> {
    let names = parse_privileges(privileges)?;
    let mut acl = open(root, target).await?;
    let principal = Principal::new(principal);

    if acl.privilege_collection().owner() == Some(&principal) {
        bail!("{} owns {}, its privileges can't be changed", principal, target.path);
    }

    let mut privilege = acl
        .privilege_collection()
        .get(&principal)
        .cloned()
        .unwrap_or_else(|| Privilege::new(principal.clone()));
    for n in names {
        change(&mut privilege, n);
    }

    let tx = Transaction::new(target.acting.as_str());
    acl.edit_privilege(&tx, privilege)
        .await
        .with_context(|| format!("edit privileges of {}", principal))?;
    show(&acl);
    Ok(())
}

fn show(acl: &ResourceAcl) {
    let col = acl.privilege_collection();
    println!("resource: {}", acl.resource());
    println!("record file: {}", acl.location());
    println!("state: {:?}", acl.state());
    match col.owner() {
        Some(owner) => println!("owner: {}", owner),
        None => println!("owner: (none)"),
    }
    for entry in col.entries() {
        let list = |it: &mut dyn Iterator<Item = PrivilegeName>| {
            it.map(|p| p.as_str()).collect::<Vec<_>>().join(",")
        };
        println!(
            "  {}: granted=[{}] denied=[{}]",
            entry.principal(),
            list(&mut entry.granted()),
            list(&mut entry.denied())
        );
    }
}
