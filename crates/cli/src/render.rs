//! Table rendering of plans, reports and configuration.

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use broke_core::actions::{GitlabAction, MailcowAction, OutlineAction};
use broke_core::config::{BrokeConfig, MappingCriteria, TargetKind};
use broke_core::targets::ConnectionStatus;
use broke_core::{Plan, RunReport, User};

use crate::style;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

pub fn print_plan(plan: &Plan) {
    println!("{}", style::header("Plan"));

    if plan.is_empty() {
        println!(
            "  {}",
            style::success(&format!(
                "All targets are up to date ({} users checked)",
                plan.user_plans.len()
            ))
        );
        return;
    }

    let mut table = new_table(vec!["User", "Source", "Target", "Action", "Details"]);
    for user_plan in plan.user_plans.iter().filter(|p| p.has_actions()) {
        let user = &user_plan.user;
        let actions = &user_plan.actions;

        for a in &actions.mailcow_actions {
            let (action, details) = match &a.action {
                MailcowAction::CreateAccount {
                    domain,
                    auth_source,
                } => (
                    "create mailbox",
                    format!("{}@{} (auth: {})", user.username, domain, auth_source),
                ),
            };
            table.add_row(row(user, &a.target, action, details));
        }
        for a in &actions.outline_actions {
            let (action, details) = match &a.action {
                OutlineAction::AddGroup { group_name } => ("add to group", group_name.clone()),
                OutlineAction::SetRole { role } => ("set role", role.to_string()),
            };
            table.add_row(row(user, &a.target, action, details));
        }
        for a in &actions.gitlab_actions {
            let (action, details) = match &a.action {
                GitlabAction::AddGroup {
                    group_name,
                    permission_level,
                } => ("add to group", format!("{} as {}", group_name, permission_level)),
                GitlabAction::SetAccessLevel { access_level } => {
                    ("set access level", access_level.to_string())
                }
            };
            table.add_row(row(user, &a.target, action, details));
        }
    }

    println!("{table}");
    println!(
        "  {} actions for {} of {} users",
        plan.action_count(),
        plan.users_with_actions(),
        plan.user_plans.len()
    );
}

fn row(user: &User, target: &str, action: &str, details: String) -> Vec<Cell> {
    vec![
        Cell::new(&user.username),
        Cell::new(&user.source),
        Cell::new(target),
        Cell::new(action).fg(Color::Yellow),
        Cell::new(details),
    ]
}

pub fn print_report(report: &RunReport) {
    let elapsed = report.completed_at - report.started_at;
    let seconds = elapsed.num_milliseconds() as f64 / 1000.0;
    if report.dry_run {
        println!(
            "{}",
            style::warn(&format!(
                "Dry run: {} actions for {} users were not applied ({:.1}s)",
                report.actions_planned, report.users, seconds
            ))
        );
    } else {
        println!(
            "{}",
            style::success(&format!(
                "Applied {} actions for {} users in {:.1}s",
                report.actions_applied, report.users, seconds
            ))
        );
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

pub fn print_connections(statuses: &[ConnectionStatus]) {
    let mut table = new_table(vec!["Name", "Kind", "Status"]);
    for status in statuses {
        let cell = match &status.error {
            None => Cell::new("✓ ok").fg(Color::Green),
            Some(e) => Cell::new(format!("✗ {}", e)).fg(Color::Red),
        };
        table.add_row(vec![Cell::new(&status.name), Cell::new(status.kind), cell]);
    }
    println!("{table}");
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub fn print_config(config: &BrokeConfig) {
    println!("{}", style::header("User sources"));
    let mut table = new_table(vec!["Name", "Type", "URL", "Realm", "Load", "Credentials"]);
    for source in &config.user_sources {
        let kc = &source.keycloak;
        let resolved = kc.admin_username.is_some() && kc.admin_password.is_some();
        table.add_row(vec![
            Cell::new(&source.name),
            Cell::new("keycloak"),
            Cell::new(&kc.url),
            Cell::new(&kc.realm),
            Cell::new(format!("{:?}", source.load.load_type).to_lowercase()),
            Cell::new(style::secret_state(resolved)),
        ]);
    }
    println!("{table}");

    println!("{}", style::header("User targets"));
    let mut table = new_table(vec!["Name", "Kind", "URL", "Mappings", "API key"]);
    for target in &config.user_targets {
        let resolved = match &target.kind {
            TargetKind::Mailcow(c) => c.api_key.is_some(),
            TargetKind::Outline(c) => c.api_key.is_some(),
            TargetKind::Gitlab(c) => c.api_key.is_some(),
        };
        table.add_row(vec![
            Cell::new(&target.name),
            Cell::new(target.kind.kind_name()),
            Cell::new(target.kind.url()),
            Cell::new(target.kind.mapping_count()),
            Cell::new(style::secret_state(resolved)),
        ]);
    }
    println!("{table}");

    for target in &config.user_targets {
        println!(
            "{} {}",
            style::header(&format!("Mappings of '{}'", target.name)),
            style::dim(&format!("({})", target.kind.kind_name()))
        );
        let mut table = new_table(vec!["#", "Criteria", "Effect"]);
        let rows: Vec<(String, String)> = match &target.kind {
            TargetKind::Mailcow(c) => c
                .mappings
                .iter()
                .map(|m| {
                    (
                        criteria(&m.criteria),
                        format!("mailbox at {} (auth: {})", m.domain, m.auth_source),
                    )
                })
                .collect(),
            TargetKind::Outline(c) => c
                .mappings
                .iter()
                .map(|m| {
                    let mut effects = Vec::new();
                    if let Some(group) = &m.outline_group {
                        effects.push(format!("group {}", group));
                    }
                    if let Some(role) = &m.outline_role {
                        effects.push(format!("role {}", role));
                    }
                    (criteria(&m.criteria), effects.join(", "))
                })
                .collect(),
            TargetKind::Gitlab(c) => c
                .mappings
                .iter()
                .map(|m| {
                    let mut effects = Vec::new();
                    if let Some(level) = &m.access_level {
                        effects.push(format!("access {}", level));
                    }
                    for a in &m.group_assignments {
                        effects.push(format!("group {} as {}", a.group, a.permission));
                    }
                    (criteria(&m.criteria), effects.join(", "))
                })
                .collect(),
        };
        for (i, (crit, effect)) in rows.into_iter().enumerate() {
            table.add_row(vec![Cell::new(i + 1), Cell::new(crit), Cell::new(effect)]);
        }
        println!("{table}");
    }
}

fn criteria(c: &MappingCriteria) -> String {
    let mut parts = Vec::new();
    if let Some(group) = &c.group {
        parts.push(format!("group {}", group));
    }
    if let Some(role) = &c.role {
        parts.push(format!("role {}", role));
    }
    if let Some(usernames) = &c.usernames {
        parts.push(format!("usernames {} (not evaluated)", usernames.join(", ")));
    }
    if parts.is_empty() {
        "(none)".to_string()
    } else {
        parts.join(" or ")
    }
}
