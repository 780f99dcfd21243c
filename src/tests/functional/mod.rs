// Licensed under the Apache-2.0 license

pub mod transaction_test;
