//! Output formatting utilities

use lineage_core::{
    AddParentOutcome, ChildLink, Individual, Page, Parents, Spouse, TreeNode, Union,
};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Format `data` as pretty JSON, or as text produced by `table`
pub fn format_output<T: Serialize>(
    data: &T,
    format: OutputFormat,
    table: impl FnOnce(&T) -> String,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::Table => Ok(table(data)),
    }
}

pub fn print<T: Serialize>(
    data: &T,
    format: OutputFormat,
    table: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    println!("{}", format_output(data, format, table)?);
    Ok(())
}

/// One-line summary: `#id Name (gender) b. date d. date`
pub fn individual_line(individual: &Individual) -> String {
    let mut line = format!(
        "#{} {} ({})",
        individual.id, individual.full_name, individual.gender
    );
    if let Some(born) = individual.birth_date {
        line.push_str(&format!(" b. {}", born));
    }
    if let Some(died) = individual.death_date {
        line.push_str(&format!(" d. {}", died));
    }
    line
}

pub fn individual_detail(individual: &Individual) -> String {
    let mut lines = vec![individual_line(individual)];
    let optional = [
        ("Birth place", individual.birth_place.as_deref()),
        ("Death place", individual.death_place.as_deref()),
        ("Occupation", individual.occupation.as_deref()),
        ("Notes", individual.notes.as_deref()),
        ("Photo", individual.photo_url.as_deref()),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            lines.push(format!("  {}: {}", label, value));
        }
    }
    if let Some(father) = individual.father_id {
        lines.push(format!("  Father: #{}", father));
    }
    if let Some(mother) = individual.mother_id {
        lines.push(format!("  Mother: #{}", mother));
    }
    lines.push(format!("  Updated: {}", individual.updated_at));
    lines.join("\n")
}

pub fn individual_list(title: &str, people: &[Individual]) -> String {
    if people.is_empty() {
        return format!("No {} found", title);
    }
    let mut lines = vec![format!("{} ({}):", capitalize(title), people.len())];
    lines.extend(people.iter().map(|p| format!("  {}", individual_line(p))));
    lines.join("\n")
}

pub fn page(page: &Page<Individual>) -> String {
    if page.items.is_empty() {
        return format!("No matches ({} total)", page.total);
    }
    let mut lines = vec![format!(
        "Showing {}-{} of {}:",
        page.offset + 1,
        page.offset + page.items.len(),
        page.total
    )];
    lines.extend(page.items.iter().map(|p| format!("  {}", individual_line(p))));
    lines.join("\n")
}

pub fn parents(parents: &Parents) -> String {
    let show = |p: &Option<Individual>| {
        p.as_ref()
            .map(individual_line)
            .unwrap_or_else(|| "(unknown)".to_string())
    };
    format!(
        "Father: {}\nMother: {}",
        show(&parents.father),
        show(&parents.mother)
    )
}

pub fn spouses(spouses: &[Spouse]) -> String {
    if spouses.is_empty() {
        return "No spouses found".to_string();
    }
    let mut lines = vec![format!("Spouses ({}):", spouses.len())];
    for spouse in spouses {
        lines.push(format!(
            "  {}. {} [union #{}]",
            spouse.marriage_order,
            individual_line(&spouse.individual),
            spouse.union_id
        ));
    }
    lines.join("\n")
}

pub fn union_line(union: &Union) -> String {
    let party = |id: Option<lineage_core::IndividualId>| {
        id.map(|id| format!("#{}", id))
            .unwrap_or_else(|| "?".to_string())
    };
    let mut line = format!(
        "Union #{}: {} + {} (marriage {})",
        union.id,
        party(union.husband_id),
        party(union.wife_id),
        union.marriage_order
    );
    if let Some(date) = union.marriage_date {
        line.push_str(&format!(" married {}", date));
    }
    if let Some(date) = union.divorce_date {
        line.push_str(&format!(" divorced {}", date));
    }
    line
}

pub fn union_list(unions: &[Union]) -> String {
    if unions.is_empty() {
        return "No unions found".to_string();
    }
    unions.iter().map(union_line).collect::<Vec<_>>().join("\n")
}

pub fn child_links(links: &[ChildLink]) -> String {
    if links.is_empty() {
        return "No children linked".to_string();
    }
    links
        .iter()
        .map(|l| {
            if l.relationship.is_empty() {
                format!("  #{}", l.individual_id)
            } else {
                format!("  #{} ({})", l.individual_id, l.relationship)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Indented tree, one individual per line
pub fn tree(root: &TreeNode) -> String {
    let mut lines = Vec::new();
    tree_lines(root, 0, &mut lines);
    lines.join("\n")
}

fn tree_lines(node: &TreeNode, depth: usize, lines: &mut Vec<String>) {
    let mut line = format!("{}{}", "  ".repeat(depth), individual_line(&node.individual));
    if let Some(spouse) = &node.spouse {
        line.push_str(&format!(" + {}", individual_line(spouse)));
    }
    lines.push(line);
    for child in &node.children {
        tree_lines(child, depth + 1, lines);
    }
}

pub fn add_parent(outcome: &AddParentOutcome) -> String {
    let mut lines = vec![
        format!("Created parent {}", individual_line(&outcome.parent)),
        format!("Re-parented {} individual(s)", outcome.reparented.len()),
    ];
    if let Some(union) = &outcome.union {
        lines.push(union_line(union));
    }
    for failure in &outcome.failures {
        lines.push(format!(
            "  failed: #{} {}: {}",
            failure.individual_id, failure.full_name, failure.reason
        ));
    }
    if let Some(error) = &outcome.union_error {
        lines.push(format!("  union not created: {}", error));
    }
    lines.join("\n")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
