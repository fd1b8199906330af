mod hash_bucket_page;
mod hash_directory_page;

pub use hash_bucket_page::{HashBucketPage, HashBucketPageRef, BUCKET_ARRAY_SIZE};
pub use hash_directory_page::{
    HashDirectoryPage, HashDirectoryPageRef, DIRECTORY_ARRAY_SIZE, DIRECTORY_MAX_DEPTH,
};
