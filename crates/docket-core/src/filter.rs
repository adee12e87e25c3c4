use anyhow::anyhow;
use tracing::trace;

use crate::activity::{
  Activity,
  Status
};

/// Selector values that disable a
/// filter dimension.
const PASS_THROUGH: [&str; 5] = [
  "all",
  "consolidated",
  "todos",
  "consolidado",
  "*"
];

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq,
)]
pub enum NoteFilter {
  #[default]
  Any,
  WithNote,
  WithoutNote
}

impl NoteFilter {
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "with" | "has" | "yes" => {
        Ok(Self::WithNote)
      }
      | "without" | "none" | "no" => {
        Ok(Self::WithoutNote)
      }
      | other
        if is_pass_through(other) =>
      {
        Ok(Self::Any)
      }
      | other => Err(anyhow!(
        "invalid note filter: {other}"
      ))
    }
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ActivityFilter {
  pub sheet:  Option<String>,
  pub owner:  Option<String>,
  pub status: Option<Status>,
  pub note:   NoteFilter
}

fn is_pass_through(raw: &str) -> bool {
  let lower =
    raw.trim().to_lowercase();
  lower.is_empty()
    || PASS_THROUGH.contains(
      &lower.as_str()
    )
}

fn selector(
  raw: Option<&str>
) -> Option<String> {
  raw
    .filter(|value| {
      !is_pass_through(value)
    })
    .map(str::to_string)
}

impl ActivityFilter {
  /// Builds a filter from the four
  /// selector values. `None`, blank or a
  /// sentinel such as `all` disables a
  /// dimension.
  pub fn from_selectors(
    sheet: Option<&str>,
    owner: Option<&str>,
    status: Option<&str>,
    note: Option<&str>
  ) -> anyhow::Result<Self> {
    let status = match selector(status)
    {
      | Some(raw) => {
        Some(
          Status::parse(&raw)
            .ok_or_else(|| {
              anyhow!(
                "invalid status \
                 filter: {raw}"
              )
            })?
        )
      }
      | None => None
    };
    let note = match note {
      | Some(raw) => {
        NoteFilter::parse(raw)?
      }
      | None => NoteFilter::Any
    };

    Ok(Self {
      sheet: selector(sheet),
      owner: selector(owner),
      status,
      note
    })
  }

  /// Parses `key:value` terms, e.g.
  /// `owner:Ana status:done`.
  #[tracing::instrument(skip(terms))]
  pub fn parse(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut sheet = None;
    let mut owner = None;
    let mut status = None;
    let mut note = None;

    for term in terms {
      let (key, value) = term
        .split_once(':')
        .or_else(|| {
          term.split_once('=')
        })
        .ok_or_else(|| {
          anyhow!(
            "expected key:value filter \
             term, got: {term}"
          )
        })?;
      match key
        .trim()
        .to_ascii_lowercase()
        .as_str()
      {
        | "sheet" | "origin" => {
          sheet = Some(value)
        }
        | "owner" | "responsible" => {
          owner = Some(value)
        }
        | "status" => {
          status = Some(value)
        }
        | "note" | "notes" => {
          note = Some(value)
        }
        | other => {
          return Err(anyhow!(
            "unknown filter key: {other}"
          ));
        }
      }
    }

    Self::from_selectors(
      sheet, owner, status, note
    )
  }

  pub fn is_pass_through(&self) -> bool {
    *self == Self::default()
  }

  pub fn matches(
    &self,
    activity: &Activity
  ) -> bool {
    if let Some(sheet) = &self.sheet
      && activity.source_sheet != *sheet
    {
      return false;
    }
    if let Some(owner) = &self.owner
      && activity.owner != *owner
    {
      return false;
    }
    if let Some(status) = self.status
      && activity.status != status
    {
      return false;
    }

    let ok = match self.note {
      | NoteFilter::Any => true,
      | NoteFilter::WithNote => {
        activity.has_note()
      }
      | NoteFilter::WithoutNote => {
        !activity.has_note()
      }
    };
    trace!(id = %activity.id, ok, "filter evaluated");
    ok
  }
}
