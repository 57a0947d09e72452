mod conv_test;
mod norm_test;
