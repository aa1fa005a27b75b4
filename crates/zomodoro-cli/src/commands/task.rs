//! Task management commands for CLI.

use clap::Subcommand;

use super::{announce, open, print_events, CliResult};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Add a task
    Add {
        /// Task name
        name: String,
        /// Estimated pomodoros (default: 1)
        #[arg(long, default_value = "1")]
        pomodoros: u32,
    },
    /// List tasks
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Toggle a task's completed flag
    Done {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Delete every task
    Clear,
}

pub fn run(action: TaskAction) -> CliResult {
    let mut session = open()?;
    let app = &mut session.app;

    match action {
        TaskAction::Add { name, pomodoros } => {
            let task = app.add_task(&name, pomodoros)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(app.tasks())?);
            } else if app.tasks().is_empty() {
                println!("No tasks yet.");
            } else {
                for task in app.tasks().iter() {
                    let mark = if task.completed { "x" } else { " " };
                    println!(
                        "[{mark}] {}  {}  {}/{}",
                        &task.id[..8.min(task.id.len())],
                        task.name,
                        task.completed_pomodoros,
                        task.required_pomodoros
                    );
                }
            }
        }
        TaskAction::Done { id } => {
            let id = app.find_task(&id)?;
            let (completed, events) = app.toggle_task(&id)?;
            println!("{}", serde_json::json!({ "id": id, "completed": completed }));
            print_events(&events)?;
            announce(&events);
        }
        TaskAction::Delete { id } => {
            let id = app.find_task(&id)?;
            let task = app.delete_task(&id)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::Clear => {
            let notice = app.clear_tasks()?;
            print_events(std::slice::from_ref(&notice))?;
            announce(std::slice::from_ref(&notice));
        }
    }
    Ok(())
}
