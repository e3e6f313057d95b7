pub mod ovs;
