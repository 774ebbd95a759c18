//! Policy inspection and editing.
//!
//! Every edit loads the current policy, derives a new one and hands it to
//! the store, which writes it back into the config file and reloads it.

use anyhow::{Context, Result, bail};
use clap::Parser;
use kiosk_security::{
    AccessMask, AceKind, GenericRight, Rights, SecurityDescriptorStore, SecurityPolicy, Sid,
};
use serde::Serialize;
use tracing::info;

/// Policy CLI command.
#[derive(Debug, Parser)]
pub struct PolicyCli {
    #[command(subcommand)]
    pub subcommand: PolicySubcommand,
}

/// Policy subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum PolicySubcommand {
    /// Print the current policy
    Show(PolicyShowArgs),

    /// Replace the whole policy with a descriptor string
    Set(PolicySetArgs),

    /// Append an allow entry
    Grant(PolicyGrantArgs),

    /// Prepend a deny entry
    Deny(PolicyDenyArgs),

    /// Remove every entry naming a SID
    Remove(PolicyRemoveArgs),
}

#[derive(Debug, Parser)]
pub struct PolicyShowArgs {
    /// Output entries as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct PolicySetArgs {
    /// Descriptor string, e.g. `D:(A;;GA;;;BA)`
    pub descriptor: String,
}

#[derive(Debug, Parser)]
pub struct PolicyGrantArgs {
    /// SID or well-known alias (WD, AU, BA, ...)
    pub sid: String,

    /// `view-only`, `interactive`, `full`, or a list of rights
    /// (`connect,view`)
    pub rights: String,
}

#[derive(Debug, Parser)]
pub struct PolicyDenyArgs {
    /// SID or well-known alias
    pub sid: String,

    /// List of rights to deny (`interact,createvirtualchannel`)
    pub rights: String,
}

#[derive(Debug, Parser)]
pub struct PolicyRemoveArgs {
    /// SID or well-known alias
    pub sid: String,
}

#[derive(Debug, Serialize)]
struct EntryView {
    kind: &'static str,
    sid: String,
    mask: String,
    rights: String,
}

impl PolicyCli {
    pub fn run(self, store: &SecurityDescriptorStore) -> Result<()> {
        match self.subcommand {
            PolicySubcommand::Show(args) => show(store, args.json),
            PolicySubcommand::Set(args) => {
                let policy: SecurityPolicy = args
                    .descriptor
                    .parse()
                    .context("Invalid descriptor string")?;
                save(store, &policy)
            }
            PolicySubcommand::Grant(args) => {
                let sid = parse_sid(&args.sid)?;
                let mask = parse_grant(&args.rights)?;
                let policy = store.current()?.with_allow(sid, mask);
                save(store, &policy)
            }
            PolicySubcommand::Deny(args) => {
                let sid = parse_sid(&args.sid)?;
                let rights = Rights::parse_list(&args.rights)?;
                let policy = store
                    .current()?
                    .with_deny(sid, AccessMask::from_rights(rights));
                save(store, &policy)
            }
            PolicySubcommand::Remove(args) => {
                let sid = parse_sid(&args.sid)?;
                let current = store.current()?;
                let policy = current.without_sid(&sid);
                if policy.entries().len() == current.entries().len() {
                    bail!("No entry names {}", sid.to_short_string());
                }
                save(store, &policy)
            }
        }
    }
}

fn show(store: &SecurityDescriptorStore, json: bool) -> Result<()> {
    let policy = store.current()?;
    if !json {
        println!("{policy}");
        if policy.is_unrestricted() {
            println!("(no access control: every caller holds every right)");
        } else if policy.entries().is_empty() {
            println!("(empty list: no caller holds any right)");
        }
        return Ok(());
    }

    let entries = policy
        .entries()
        .iter()
        .map(|ace| {
            Ok(EntryView {
                kind: match ace.kind {
                    AceKind::Allow => "allow",
                    AceKind::Deny => "deny",
                },
                sid: ace.sid.to_string(),
                mask: ace.mask.to_string(),
                rights: ace.mask.map_generic()?.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn save(store: &SecurityDescriptorStore, policy: &SecurityPolicy) -> Result<()> {
    let saved = store.replace(policy).context("Failed to save policy")?;
    info!(entries = saved.entries().len(), "policy saved");
    println!("{saved}");
    Ok(())
}

fn parse_sid(s: &str) -> Result<Sid> {
    s.parse().with_context(|| format!("Invalid SID `{s}`"))
}

/// A preset keeps its generic bit so the stored entry reads as `GR`/`GW`/`GA`.
pub fn parse_grant(s: &str) -> Result<AccessMask> {
    if let Some(generic) = GenericRight::from_name(s.trim()) {
        return Ok(AccessMask::from_generic(generic));
    }
    let rights = Rights::parse_list(s).with_context(|| format!("Invalid rights `{s}`"))?;
    Ok(AccessMask::from_rights(rights))
}
