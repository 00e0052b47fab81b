pub mod admission;
pub mod booking;
pub mod memory;
pub mod store;

pub use admission::{Admission, SlotAdmissionController};
pub use booking::AppointmentBookingService;
pub use memory::InMemoryAppointmentStore;
pub use store::{AppointmentStore, SupabaseAppointmentStore};
