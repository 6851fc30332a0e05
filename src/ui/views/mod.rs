mod entry_detail;
mod entry_list;
mod store_list;

pub use entry_detail::EntryDetailView;
pub use entry_list::EntryListView;
pub use store_list::StoreListView;
