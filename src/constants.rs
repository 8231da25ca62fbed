//! Column and relation names shared across the readers, the join and the aggregations.
//! The configurable ones are overridable through `[columns]` in the config file;
//! these are the defaults.

// Key columns
pub const BUSINESS_ID: &str = "BusinessId";
pub const REVIEW_ID: &str = "ReviewId";
pub const USER_ID: &str = "UserId";

// Attribute columns read by the aggregations
pub const STARS: &str = "Stars";
pub const ADDRESS: &str = "Address";

// Attribute dropped from business documents (duplicated by the review side)
pub const BUSINESS_NAME: &str = "Business - Name";

// Row-index columns left behind by dataframe CSV exports
pub const CSV_INDEX_COLUMNS: [&str; 2] = ["", "Unnamed: 0"];

// Relations expected in the relational snapshot
pub const USERS_RELATION: &str = "Users2";
pub const BUSINESS_ATTRIBUTES_RELATION: &str = "business_attributes";

// Derived columns
pub const ZIPCODE: &str = "Zipcode";
pub const AVERAGE_REVIEW_STARS: &str = "AverageReviewStars";
pub const NUMBER_OF_REVIEWS_WRITTEN: &str = "NumberOfReviewsWritten";
pub const ZIPCODE_LEN: usize = 5;

// Aggregate sizes
pub const TOP_ZIPCODES: usize = 5;
pub const TOP_USERS: usize = 10;

// Output artifact names
pub const MERGED_OUTPUT: &str = "merged_reviews.csv.gz";
pub const MEAN_RATING_OUTPUT: &str = "mean_rating_by_business.csv";
pub const TOP_ZIPCODE_OUTPUT: &str = "top_zipcode_mean_rating.csv";
pub const TOP_USERS_OUTPUT: &str = "top_users_by_review_count.csv";

// Source file extensions recognised by discovery
pub const JSON_EXTENSION: &str = "json";
pub const CSV_EXTENSION: &str = "csv";
pub const SQLITE_EXTENSION: &str = "sqlite";
pub const ZIP_EXTENSION: &str = "zip";

// Nested archives deeper than this are rejected
pub const MAX_ARCHIVE_DEPTH: usize = 4;

// Credential environment variables for the HTTP object store
pub const ACCESS_KEY_ENV: &str = "REVIEW_ETL_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "REVIEW_ETL_SECRET_KEY";

pub const DEFAULT_CONFIG_PATH: &str = "review_etl.toml";
