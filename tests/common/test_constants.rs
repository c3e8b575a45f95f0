//! Constants shared by the integration tests.

pub const SIMPLE_TEMPLATE_URL: &str =
    "https://s3.amazonaws.com/downloads/testing/single-master.cloudformation.json";

pub const MULTI_MASTER_TEMPLATE_URL: &str =
    "https://s3.amazonaws.com/downloads/testing/multi-master.cloudformation.json";

pub const ZEN_TEMPLATE_URL: &str =
    "https://s3.amazonaws.com/downloads/testing/zen.cloudformation.json";

pub const ACCESS_KEY_ID: &str = "AKIAEXAMPLE";

pub const SECRET_ACCESS_KEY: &str = "example-secret";
