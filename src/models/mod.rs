pub mod user;
pub mod event;
pub mod ticket;

pub use user::{User, UserId, UserSummary};
pub use event::{BookedEvent, Event, EventCategory, EventFilter, EventId, NewEvent};
pub use ticket::{is_valid_price, NewTicket, Ticket, TicketChanges, TicketId};
