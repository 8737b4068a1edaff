// Event-driven architecture components
//
// This module provides the infrastructure for broadcasting gamification
// facts (awards, rank changes, milestones) to interested subscribers
// without coupling the awarding flow to its consumers.

// Public API - what other modules can use
pub use bus::EventBus;
pub use events::GamificationEvent;

// Internal modules
mod bus;
mod events;
