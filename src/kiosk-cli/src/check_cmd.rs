//! Effective-rights check and rights listing.

use anyhow::{Context, Result};
use clap::Parser;
use kiosk_broker::ControlLevel;
use kiosk_security::{AccessToken, GenericRight, PermissionModel, Rights, Sid};
use serde::Serialize;

/// Arguments for the check command.
#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// User SID of the caller
    #[arg(long, short = 'u')]
    pub user: String,

    /// Group SIDs the caller belongs to (repeatable)
    #[arg(long = "group", short = 'g')]
    pub groups: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the rights command.
#[derive(Debug, Parser)]
pub struct RightsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    user: String,
    rights: Vec<&'static str>,
    max_level: ControlLevel,
}

#[derive(Debug, Serialize)]
struct RightInfo {
    name: &'static str,
    code: &'static str,
    bits: String,
    expands_to: Option<String>,
}

pub fn run_check(args: CheckArgs, permissions: &PermissionModel) -> Result<()> {
    let user: Sid = args
        .user
        .parse()
        .with_context(|| format!("Invalid user SID `{}`", args.user))?;
    let groups = args
        .groups
        .iter()
        .map(|g| {
            g.parse::<Sid>()
                .with_context(|| format!("Invalid group SID `{g}`"))
        })
        .collect::<Result<Vec<_>>>()?;
    let token = AccessToken::new(user.clone()).with_groups(groups);

    let rights = permissions
        .effective_rights(&token)
        .context("Access check failed")?;
    let report = CheckReport {
        user: user.to_string(),
        rights: Rights::each()
            .filter(|r| rights.contains(*r))
            .map(Rights::label)
            .collect(),
        max_level: ControlLevel::max_for(rights),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("User:      {}", report.user);
        println!("Rights:    {rights}");
        println!("Max level: {}", report.max_level);
    }
    Ok(())
}

pub fn run_rights(args: RightsArgs) -> Result<()> {
    let rights = rights_table();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rights)?);
        return Ok(());
    }

    println!("{:<22} {:<5} {:<12} EXPANDS TO", "NAME", "CODE", "BITS");
    for info in &rights {
        println!(
            "{:<22} {:<5} {:<12} {}",
            info.name,
            info.code,
            info.bits,
            info.expands_to.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn rights_table() -> Vec<RightInfo> {
    let specific = Rights::each().map(|right| RightInfo {
        name: right.label(),
        code: right.code(),
        bits: format!("{:#010x}", right.bits()),
        expands_to: None,
    });
    let generic = GenericRight::ALL_VARIANTS.iter().map(|generic| RightInfo {
        name: generic_name(*generic),
        code: generic.code(),
        bits: format!("{:#010x}", generic.mask_bit()),
        expands_to: Some(generic.rights().to_string()),
    });
    specific.chain(generic).collect()
}

fn generic_name(generic: GenericRight) -> &'static str {
    match generic {
        GenericRight::Read => "GenericRead",
        GenericRight::Write => "GenericWrite",
        GenericRight::Execute => "GenericExecute",
        GenericRight::All => "GenericAll",
    }
}
