//! Person commands: individual CRUD and relationship queries

use chrono::NaiveDate;
use clap::{Args, Subcommand};
use lineage_core::{Gender, IndividualId, IndividualUpdate, NewIndividual, ParentRole};

use crate::output;
use crate::AppContext;

#[derive(Args)]
pub struct PersonArgs {
    #[command(subcommand)]
    pub command: PersonCommands,
}

/// Fields shared by `add` and `add-parent`
#[derive(Args)]
pub struct PersonDetails {
    /// Birth date (YYYY-MM-DD)
    #[arg(long)]
    pub born: Option<NaiveDate>,
    /// Death date (YYYY-MM-DD)
    #[arg(long)]
    pub died: Option<NaiveDate>,
    #[arg(long)]
    pub birth_place: Option<String>,
    #[arg(long)]
    pub death_place: Option<String>,
    #[arg(long)]
    pub occupation: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub photo: Option<String>,
}

impl PersonDetails {
    fn draft(&self, name: &str, gender: Gender) -> NewIndividual {
        NewIndividual {
            full_name: name.to_string(),
            gender,
            birth_date: self.born,
            birth_place: self.birth_place.clone(),
            death_date: self.died,
            death_place: self.death_place.clone(),
            occupation: self.occupation.clone(),
            notes: self.notes.clone(),
            photo_url: self.photo.clone(),
            father_id: None,
            mother_id: None,
        }
    }
}

#[derive(Subcommand)]
pub enum PersonCommands {
    /// Add a new individual
    Add {
        /// Full name
        name: String,
        /// male, female, other or unknown
        #[arg(long, default_value = "unknown")]
        gender: Gender,
        /// Father's id
        #[arg(long)]
        father: Option<i64>,
        /// Mother's id
        #[arg(long)]
        mother: Option<i64>,
        #[command(flatten)]
        details: PersonDetails,
    },
    /// Show an individual
    Get { id: i64 },
    /// Update fields of an individual
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        gender: Option<Gender>,
        #[arg(long)]
        born: Option<NaiveDate>,
        #[arg(long)]
        died: Option<NaiveDate>,
        #[arg(long)]
        occupation: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, conflicts_with = "clear_father")]
        father: Option<i64>,
        #[arg(long, conflicts_with = "clear_mother")]
        mother: Option<i64>,
        /// Remove the father reference
        #[arg(long)]
        clear_father: bool,
        /// Remove the mother reference
        #[arg(long)]
        clear_mother: bool,
    },
    /// Delete an individual with no children and no unions
    Delete { id: i64 },
    /// Search by name or notes
    Search {
        #[arg(default_value = "")]
        text: String,
        #[arg(short, long, default_value = "10")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// List children
    Children { id: i64 },
    /// Show father and mother
    Parents { id: i64 },
    /// List full and half siblings
    Siblings { id: i64 },
    /// List spouses in marriage order
    Spouses { id: i64 },
    /// List ancestors, father's line first
    Ancestors {
        id: i64,
        /// Generations to walk (0 for the default, at most 10)
        #[arg(short, long, default_value = "0")]
        generations: i32,
    },
    /// List descendants
    Descendants {
        id: i64,
        #[arg(short, long, default_value = "0")]
        generations: i32,
    },
    /// Show the family tree below an individual
    Tree {
        id: i64,
        #[arg(short, long, default_value = "0")]
        generations: i32,
    },
    /// Create a missing parent and attach it to the child's siblings
    AddParent {
        /// Child id
        child: i64,
        /// father or mother
        role: ParentRole,
        /// Parent's full name
        name: String,
        #[command(flatten)]
        details: PersonDetails,
    },
}

pub async fn run(args: &PersonArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let engine = &ctx.engine;
    let cancel = &ctx.cancel;
    let format = ctx.format;

    match &args.command {
        PersonCommands::Add {
            name,
            gender,
            father,
            mother,
            details,
        } => {
            let mut draft = details.draft(name, *gender);
            draft.father_id = father.map(IndividualId);
            draft.mother_id = mother.map(IndividualId);
            let individual = engine.create_individual(&draft, cancel).await?;
            output::print(&individual, format, |i| {
                format!("Created {}", output::individual_line(i))
            })?;
        }
        PersonCommands::Get { id } => {
            let individual = engine.get_individual(IndividualId(*id), cancel).await?;
            output::print(&individual, format, output::individual_detail)?;
        }
        PersonCommands::Update {
            id,
            name,
            gender,
            born,
            died,
            occupation,
            notes,
            father,
            mother,
            clear_father,
            clear_mother,
        } => {
            let changes = IndividualUpdate {
                full_name: name.clone(),
                gender: *gender,
                birth_date: born.map(Some),
                death_date: died.map(Some),
                occupation: occupation.clone().map(Some),
                notes: notes.clone().map(Some),
                father_id: parent_change(*father, *clear_father),
                mother_id: parent_change(*mother, *clear_mother),
                ..Default::default()
            };
            let individual = engine
                .update_individual(IndividualId(*id), &changes, cancel)
                .await?;
            output::print(&individual, format, |i| {
                format!("Updated {}", output::individual_line(i))
            })?;
        }
        PersonCommands::Delete { id } => {
            let individual = engine.delete_individual(IndividualId(*id), cancel).await?;
            output::print(&individual, format, |i| {
                format!("Deleted {}", output::individual_line(i))
            })?;
        }
        PersonCommands::Search {
            text,
            limit,
            offset,
        } => {
            let page = engine
                .search_individuals(text, *limit, *offset, cancel)
                .await?;
            output::print(&page, format, output::page)?;
        }
        PersonCommands::Children { id } => {
            let children = engine.get_children(IndividualId(*id), cancel).await?;
            output::print(&children, format, |c| output::individual_list("children", c))?;
        }
        PersonCommands::Parents { id } => {
            let parents = engine.get_parents(IndividualId(*id), cancel).await?;
            output::print(&parents, format, output::parents)?;
        }
        PersonCommands::Siblings { id } => {
            let siblings = engine.get_siblings(IndividualId(*id), cancel).await?;
            output::print(&siblings, format, |s| output::individual_list("siblings", s))?;
        }
        PersonCommands::Spouses { id } => {
            let spouses = engine.get_spouses(IndividualId(*id), cancel).await?;
            output::print(&spouses, format, |s| output::spouses(s))?;
        }
        PersonCommands::Ancestors { id, generations } => {
            let ancestors = engine
                .get_ancestors(IndividualId(*id), *generations, cancel)
                .await?;
            output::print(&ancestors, format, |a| output::individual_list("ancestors", a))?;
        }
        PersonCommands::Descendants { id, generations } => {
            let descendants = engine
                .get_descendants(IndividualId(*id), *generations, cancel)
                .await?;
            output::print(&descendants, format, |d| {
                output::individual_list("descendants", d)
            })?;
        }
        PersonCommands::Tree { id, generations } => {
            let tree = engine
                .build_tree(IndividualId(*id), *generations, cancel)
                .await?;
            output::print(&tree, format, |t| output::tree(&t.root))?;
        }
        PersonCommands::AddParent {
            child,
            role,
            name,
            details,
        } => {
            let draft = details.draft(name, role.required_gender());
            let outcome = engine
                .add_parent(IndividualId(*child), draft, *role, cancel)
                .await?;
            if !outcome.is_complete() {
                tracing::warn!("Parent added with {} failed update(s)", outcome.failures.len());
            }
            output::print(&outcome, format, output::add_parent)?;
        }
    }

    Ok(())
}

fn parent_change(parent: Option<i64>, clear: bool) -> Option<Option<IndividualId>> {
    if clear {
        Some(None)
    } else {
        parent.map(|id| Some(IndividualId(id)))
    }
}
