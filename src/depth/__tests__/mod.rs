mod ordinal_test;
