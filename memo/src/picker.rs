// Interactive stack picker: cursor-driven list that promotes the chosen
// task to the front. The daemon only ever sees a reorder permutation.

use crate::format::format_duration;
use crate::stack::Task;
use anyhow::Result;
use chrono::Utc;
use crossterm::event::{read, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::{cursor, execute};
use std::io::{self, Write};

/// Restores the terminal even on early return or panic unwind
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// The permutation that moves `selected` to the front while preserving the
/// relative order of every other task
pub fn move_to_front_order(len: usize, selected: usize) -> Vec<usize> {
    let mut order = Vec::with_capacity(len);
    order.push(selected);
    order.extend((0..len).filter(|&i| i != selected));
    order
}

fn render(stdout: &mut impl Write, tasks: &[Task], cursor_idx: usize, redraw: bool) -> Result<()> {
    if redraw {
        execute!(
            stdout,
            cursor::MoveUp(tasks.len() as u16),
            cursor::MoveToColumn(0),
            Clear(ClearType::FromCursorDown)
        )?;
    }

    for (i, task) in tasks.iter().enumerate() {
        let marker = if i == cursor_idx { "\u{2192} " } else { "  " };
        if i == 0 {
            let working = format_duration(Utc::now() - task.started_at);
            write!(
                stdout,
                "{}{} (working for {})\r\n",
                marker, task.description, working
            )?;
        } else {
            write!(stdout, "{}{}\r\n", marker, task.description)?;
        }
    }
    stdout.flush()?;
    Ok(())
}

/// Run the picker over the given tasks. Returns the index the user chose,
/// or `None` if they cancelled.
pub fn pick_task(tasks: &[Task]) -> Result<Option<usize>> {
    let _guard = RawModeGuard::enable()?;
    let mut stdout = io::stdout();
    let mut cursor_idx = 0usize;

    render(&mut stdout, tasks, cursor_idx, false)?;

    loop {
        let Event::Key(key) = read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(None);
        }

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                cursor_idx = cursor_idx.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if cursor_idx + 1 < tasks.len() {
                    cursor_idx += 1;
                }
            }
            KeyCode::Enter => return Ok(Some(cursor_idx)),
            KeyCode::Esc | KeyCode::Char('q') => return Ok(None),
            _ => continue,
        }

        render(&mut stdout, tasks, cursor_idx, true)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_to_front_order_moves_selected_first() {
        assert_eq!(move_to_front_order(4, 2), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_move_to_front_order_of_front_is_identity() {
        assert_eq!(move_to_front_order(3, 0), vec![0, 1, 2]);
    }

    #[test]
    fn test_move_to_front_order_of_last() {
        assert_eq!(move_to_front_order(3, 2), vec![2, 0, 1]);
    }

    #[test]
    fn test_move_to_front_order_is_a_permutation() {
        let order = move_to_front_order(5, 3);
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3, 4]);
    }
}
