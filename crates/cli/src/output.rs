//! Plain-text rendering for command listings.

use hiproc_engine::{Analytics, RankedCandidate};
use hiproc_types::Command;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const TEMPLATE_WIDTH: usize = 60;

/// Cut `text` to at most `max` display columns, marking the cut with an ellipsis.
pub fn truncate_to_width(text: &str, max: usize) -> String {
    if UnicodeWidthStr::width(text) <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(1);
    let mut used = 0;
    let mut out = String::new();
    for character in text.chars() {
        let width = character.width().unwrap_or(0);
        if used + width > budget {
            break;
        }
        used += width;
        out.push(character);
    }
    out.push('…');
    out
}

fn pad(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(UnicodeWidthStr::width(text));
    format!("{text}{}", " ".repeat(padding))
}

/// Left-aligned table with a header row. Columns size to their widest cell.
pub fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| UnicodeWidthStr::width(*header)).collect();
    for row in rows {
        for (index, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(index) {
                *width = (*width).max(UnicodeWidthStr::width(cell.as_str()));
            }
        }
    }
    let line = |cells: Vec<&str>| {
        let last = cells.len().saturating_sub(1);
        cells
            .iter()
            .enumerate()
            .map(|(index, cell)| if index == last { cell.to_string() } else { pad(cell, widths[index]) })
            .collect::<Vec<_>>()
            .join("  ")
    };

    let mut out = vec![line(headers.to_vec())];
    out.extend(rows.iter().map(|row| line(row.iter().map(String::as_str).collect())));
    out.join("\n")
}

fn command_row(command: &Command) -> Vec<String> {
    vec![
        command.id.to_string(),
        command.namespace.clone(),
        command.name.clone(),
        command.scope.to_string(),
        command.usage_count.to_string(),
        truncate_to_width(&command.template, TEMPLATE_WIDTH),
    ]
}

pub fn commands_table(commands: &[Command]) -> String {
    if commands.is_empty() {
        return "No commands found.".into();
    }
    let rows: Vec<_> = commands.iter().map(command_row).collect();
    table(&["ID", "NAMESPACE", "NAME", "SCOPE", "USES", "COMMAND"], &rows)
}

pub fn candidates_table(candidates: &[RankedCandidate]) -> String {
    if candidates.is_empty() {
        return "No candidates.".into();
    }
    let rows: Vec<_> = candidates
        .iter()
        .enumerate()
        .map(|(position, candidate)| {
            let mut row = vec![(position + 1).to_string(), candidate.tier.number().to_string()];
            row.extend(command_row(&candidate.command));
            row.push(candidate.command.directory.clone());
            row
        })
        .collect();
    table(&["#", "TIER", "ID", "NAMESPACE", "NAME", "SCOPE", "USES", "COMMAND", "DIRECTORY"], &rows)
}

pub fn command_details(command: &Command) -> String {
    let last_used = command
        .last_used_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".into());
    [
        format!("id:         {}", command.id),
        format!("name:       {}", command.qualified_name()),
        format!("scope:      {}", command.scope),
        format!("owner:      {}@{}", command.owner.user, command.owner.hostname),
        format!("directory:  {}", command.directory),
        format!("template:   {}", command.template),
        format!("created:    {}", command.created_at.to_rfc3339()),
        format!("last used:  {last_used}"),
        format!("uses:       {}", command.usage_count),
    ]
    .join("\n")
}

pub fn analytics_report(analytics: &Analytics) -> String {
    let mut out = vec![
        format!("Last {} days", analytics.days),
        format!("  executions:       {}", analytics.total_executions),
        format!("  unique commands:  {}", analytics.unique_commands),
        format!("  per day:          {:.1}", analytics.average_per_day),
    ];
    if !analytics.most_used.is_empty() {
        out.push(String::new());
        let rows: Vec<_> = analytics
            .most_used
            .iter()
            .map(|usage| vec![usage.id.to_string(), format!("{}/{}", usage.namespace, usage.name), usage.executions.to_string()])
            .collect();
        out.push(table(&["ID", "COMMAND", "RUNS"], &rows));
    }
    if !analytics.methods.is_empty() {
        out.push(String::new());
        out.extend(analytics.methods.iter().map(|(method, count)| format!("  {:<15} {count}", method.as_str())));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_counts_display_columns() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefghij", 5), "abcd…");
        // Each CJK character is two columns wide.
        assert_eq!(truncate_to_width("日本語テキスト", 7), "日本語…");
    }

    #[test]
    fn table_aligns_on_widest_cell() {
        let rendered = table(&["ID", "NAME"], &[vec!["1".into(), "deploy".into()], vec!["12".into(), "logs".into()]]);
        let lines: Vec<_> = rendered.lines().collect();
        assert_eq!(lines, vec!["ID  NAME", "1   deploy", "12  logs"]);
    }
}
