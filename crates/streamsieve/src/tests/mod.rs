mod channels;
mod pipeline;
mod property_partition;
