//! End-to-end decision scenarios against hand-written collaborators.

mod fixtures;
mod mock_collaborators;
mod scenarios;
mod sweep;
