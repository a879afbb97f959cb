//! Union commands: marriages and the children linked to them

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use lineage_core::{IndividualId, NewUnion, UnionId, UnionUpdate};

use crate::output;
use crate::AppContext;

#[derive(Args)]
pub struct UnionArgs {
    #[command(subcommand)]
    pub command: UnionCommands,
}

#[derive(Subcommand)]
pub enum UnionCommands {
    /// Create a union; the husband's marriage order is assigned automatically
    Create {
        #[arg(long)]
        husband: Option<i64>,
        #[arg(long)]
        wife: Option<i64>,
        /// Marriage date (YYYY-MM-DD)
        #[arg(long)]
        married: Option<NaiveDate>,
        /// Divorce date (YYYY-MM-DD)
        #[arg(long)]
        divorced: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Show a union
    Get { id: i64 },
    /// List the unions an individual belongs to
    List {
        /// Individual id
        individual: i64,
    },
    /// Marry two individuals, roles taken from their genders
    AddSpouse { individual: i64, spouse: i64 },
    /// Update a union's dates or notes
    Update {
        id: i64,
        #[arg(long)]
        married: Option<NaiveDate>,
        #[arg(long)]
        divorced: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
        /// Remove the divorce date
        #[arg(long, conflicts_with = "divorced")]
        clear_divorce: bool,
    },
    /// Delete a union and its child links
    Delete { id: i64 },
    /// Link a child to a union
    AddChild {
        union: i64,
        child: i64,
        /// Free-text relationship, e.g. son, daughter, adopted
        #[arg(long, default_value = "")]
        label: String,
    },
    /// Unlink a child from a union
    RemoveChild { union: i64, child: i64 },
    /// List the children linked to a union
    Children { union: i64 },
}

pub async fn run(args: &UnionArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let engine = &ctx.engine;
    let cancel = &ctx.cancel;
    let format = ctx.format;

    match &args.command {
        UnionCommands::Create {
            husband,
            wife,
            married,
            divorced,
            notes,
        } => {
            let draft = NewUnion {
                husband_id: husband.map(IndividualId),
                wife_id: wife.map(IndividualId),
                marriage_date: *married,
                divorce_date: *divorced,
                notes: notes.clone(),
            };
            let union = engine.create_union(&draft, cancel).await?;
            output::print(&union, format, |u| format!("Created {}", output::union_line(u)))?;
        }
        UnionCommands::Get { id } => {
            let union = engine.get_union(UnionId(*id), cancel).await?;
            output::print(&union, format, output::union_line)?;
        }
        UnionCommands::List { individual } => {
            let unions = engine.unions_of(IndividualId(*individual), cancel).await?;
            output::print(&unions, format, |u| output::union_list(u))?;
        }
        UnionCommands::AddSpouse { individual, spouse } => {
            let union = engine
                .add_spouse(IndividualId(*individual), IndividualId(*spouse), cancel)
                .await?;
            output::print(&union, format, |u| format!("Created {}", output::union_line(u)))?;
        }
        UnionCommands::Update {
            id,
            married,
            divorced,
            notes,
            clear_divorce,
        } => {
            let changes = UnionUpdate {
                marriage_date: married.map(Some),
                divorce_date: if *clear_divorce {
                    Some(None)
                } else {
                    divorced.map(Some)
                },
                notes: notes.clone().map(Some),
                ..Default::default()
            };
            let union = engine.update_union(UnionId(*id), &changes, cancel).await?;
            output::print(&union, format, |u| format!("Updated {}", output::union_line(u)))?;
        }
        UnionCommands::Delete { id } => {
            let union = engine.delete_union(UnionId(*id), cancel).await?;
            output::print(&union, format, |u| format!("Deleted {}", output::union_line(u)))?;
        }
        UnionCommands::AddChild {
            union,
            child,
            label,
        } => {
            let link = engine
                .add_child(UnionId(*union), IndividualId(*child), label, cancel)
                .await?;
            output::print(&link, format, |l| {
                format!("Linked child #{} to union #{}", l.individual_id, l.union_id)
            })?;
        }
        UnionCommands::RemoveChild { union, child } => {
            engine
                .remove_child(UnionId(*union), IndividualId(*child), cancel)
                .await?;
            let removed = serde_json::json!({ "union_id": union, "child_id": child });
            output::print(&removed, format, |_| {
                format!("Unlinked child #{} from union #{}", child, union)
            })?;
        }
        UnionCommands::Children { union } => {
            let links = engine.union_children(UnionId(*union), cancel).await?;
            output::print(&links, format, |l| output::child_links(l))?;
        }
    }

    Ok(())
}
